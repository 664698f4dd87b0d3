use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use effects::{MeshData, INSTANCE_STRIDE, VERTEX_STRIDE};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// Full-surface quad as a triangle strip. Texture row 0 is the image top.
pub(crate) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

/// Instance position, rotation quaternion, scale, extra.
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![4 => Float32x3, 5 => Float32x4, 6 => Float32x2, 7 => Float32x3];

const IDENTITY_INSTANCE: [f32; INSTANCE_STRIDE] =
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

pub(crate) fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

pub(crate) fn mesh_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: (VERTEX_STRIDE * size_of::<f32>()) as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: (INSTANCE_STRIDE * size_of::<f32>()) as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        },
    ]
}

pub(crate) fn create_quad_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("carousel quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

/// Vertex, index and instance buffers for a custom effect mesh. Meshes
/// without instance data draw once with an identity instance.
pub(crate) struct MeshBuffers {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub instances: wgpu::Buffer,
    pub index_count: u32,
    pub instance_count: u32,
}

impl MeshBuffers {
    pub fn new(device: &wgpu::Device, mesh: &MeshData) -> Result<Self, String> {
        mesh.validate()?;
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect mesh vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect mesh indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_data: &[f32] = if mesh.is_instanced() {
            &mesh.instances
        } else {
            &IDENTITY_INSTANCE
        };
        let instances = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect mesh instances"),
            contents: bytemuck::cast_slice(instance_data),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(Self {
            vertices,
            indices,
            instances,
            index_count: mesh.indices.len() as u32,
            instance_count: mesh.instance_count() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_effect_data_layout() {
        assert_eq!(quad_layout().array_stride, 16);
        let [vertex, instance] = mesh_layouts();
        assert_eq!(vertex.array_stride, 20);
        assert_eq!(instance.array_stride, 48);
        assert_eq!(instance.step_mode, wgpu::VertexStepMode::Instance);
        let locations: Vec<u32> = instance
            .attributes
            .iter()
            .map(|attribute| attribute.shader_location)
            .collect();
        assert_eq!(locations, vec![4, 5, 6, 7]);
        assert_eq!(instance.attributes[3].offset, 36);
    }

    #[test]
    fn quad_covers_clip_space_with_top_row_first() {
        let top_left = QUAD_VERTICES
            .iter()
            .find(|vertex| vertex.position == [-1.0, 1.0])
            .map(|vertex| vertex.tex_coord);
        assert_eq!(top_left, Some([0.0, 0.0]));
        assert_eq!(IDENTITY_INSTANCE[6], 1.0);
    }
}
