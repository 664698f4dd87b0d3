use std::borrow::Cow;
use std::mem::size_of;

use wgpu::naga::ShaderStage;

use crate::compile::{PreparedProgram, UniformLayout};
use crate::error::{CarouselError, Result};

use super::mesh;
use super::uniforms::FrameUniforms;

/// Bind group layouts shared by every effect program.
///
/// Group 0 holds the frame block (binding 0) and the effect parameter block
/// (binding 1); group 1 holds both images as texture/sampler pairs.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("carousel uniform layout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("carousel texture layout"),
            entries: &build_texture_layout_entries(),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("carousel pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            uniform_layout,
            texture_layout,
            pipeline_layout,
        }
    }
}

fn build_texture_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(4);
    for slot in 0..2u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2 + 1,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn create_texture_bind_group(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    sampler: &wgpu::Sampler,
    current: &wgpu::TextureView,
    next: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("carousel texture bind group"),
        layout: &layouts.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(current),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(next),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub(crate) fn create_frame_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("carousel frame uniforms"),
        size: size_of::<FrameUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Vertex input an effect program is linked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Geometry {
    Quad,
    Mesh,
}

/// A linked effect: pipeline, its parameter buffer and the group 0 bind
/// group that pairs that buffer with the shared frame buffer.
pub(crate) struct EffectProgram {
    pub name: String,
    pub pipeline: wgpu::RenderPipeline,
    pub params_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub layout: UniformLayout,
    pub geometry: Geometry,
}

impl EffectProgram {
    /// Compiles and links inside a validation error scope so a bad program
    /// is reported instead of poisoning the device.
    pub fn link(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        frame_buffer: &wgpu::Buffer,
        format: wgpu::TextureFormat,
        name: &str,
        prepared: PreparedProgram,
        geometry: Geometry,
    ) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name} vertex")),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(prepared.vertex),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name} fragment")),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(prepared.fragment),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        });

        let quad_buffers = [mesh::quad_layout()];
        let mesh_buffers = mesh::mesh_layouts();
        let (buffers, topology) = match geometry {
            Geometry::Quad => (&quad_buffers[..], wgpu::PrimitiveTopology::TriangleStrip),
            Geometry::Mesh => (&mesh_buffers[..], wgpu::PrimitiveTopology::TriangleList),
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{name} pipeline")),
            layout: Some(&layouts.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{name} parameters")),
            size: u64::from(prepared.layout.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{name} uniforms")),
            layout: &layouts.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(CarouselError::ShaderLinkFailure {
                effect: name.to_string(),
                message: error.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            pipeline,
            params_buffer,
            uniform_bind_group,
            layout: prepared.layout,
            geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_entries_alternate_view_and_sampler() {
        let entries = build_texture_layout_entries();
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert!(matches!(entries[1].ty, wgpu::BindingType::Sampler(_)));
        assert!(matches!(entries[2].ty, wgpu::BindingType::Texture { .. }));
    }
}
