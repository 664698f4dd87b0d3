use bytemuck::{Pod, Zeroable};

/// Built-in per-frame values. Layout must match the `CarouselFrame` block in
/// the shader prelude (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    pub resolution: [f32; 2],
    pub progress: f32,
    pub _padding0: f32,
    pub image_size0: [f32; 2],
    pub image_size1: [f32; 2],
}

impl FrameUniforms {
    pub fn new(size: (u32, u32), progress: f32, image0: (u32, u32), image1: (u32, u32)) -> Self {
        Self {
            resolution: [size.0 as f32, size.1 as f32],
            progress: progress.clamp(0.0, 1.0),
            _padding0: 0.0,
            image_size0: [image0.0 as f32, image0.1 as f32],
            image_size1: [image1.0 as f32, image1.1 as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn frame_uniforms_follow_std140_layout() {
        assert_eq!(size_of::<FrameUniforms>(), 32);
        assert_eq!(offset_of!(FrameUniforms, progress), 8);
        assert_eq!(offset_of!(FrameUniforms, image_size0), 16);
        assert_eq!(offset_of!(FrameUniforms, image_size1), 24);
    }

    #[test]
    fn progress_is_clamped() {
        let uniforms = FrameUniforms::new((10, 10), 1.5, (1, 1), (1, 1));
        assert_eq!(uniforms.progress, 1.0);
        assert_eq!(uniforms.resolution, [10.0, 10.0]);
    }
}
