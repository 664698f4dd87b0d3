use crate::error::{CarouselError, Result};
use crate::surface::Canvas;

/// Bytes per row for a texture copy, padded to wgpu's required alignment.
pub(crate) fn compute_padded_stride(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Render target used when the surface has no window. Each finished frame is
/// copied into a mappable buffer and then into the surface's canvas.
pub(crate) struct OffscreenTarget {
    texture: wgpu::Texture,
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_stride: u32,
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let padded_stride = compute_padded_stride(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: u64::from(padded_stride) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            texture,
            readback,
            width,
            height,
            padded_stride,
        }
    }

    pub fn view(&self) -> wgpu::TextureView {
        self.texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_stride),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Blocks until the copy lands, then strips row padding into `canvas`.
    pub fn read_into(&self, device: &wgpu::Device, canvas: &Canvas) -> Result<()> {
        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| CarouselError::Surface(format!("device poll failed: {err}")))?;
        rx.recv()
            .map_err(|_| CarouselError::Surface("readback channel closed".into()))?
            .map_err(|err| CarouselError::Surface(format!("readback map failed: {err}")))?;

        {
            let mapped = slice.get_mapped_range();
            let row_bytes = self.width as usize * 4;
            canvas.with_pixels_mut(|pixels| {
                if pixels.dimensions() != (self.width, self.height) {
                    *pixels = image::RgbaImage::new(self.width, self.height);
                }
                let out: &mut [u8] = pixels;
                for row in 0..self.height as usize {
                    let start = row * self.padded_stride as usize;
                    out[row * row_bytes..(row + 1) * row_bytes]
                        .copy_from_slice(&mapped[start..start + row_bytes]);
                }
            });
        }
        self.readback.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_aligned_to_copy_requirement() {
        assert_eq!(compute_padded_stride(1), 256);
        assert_eq!(compute_padded_stride(64), 256);
        assert_eq!(compute_padded_stride(65), 512);
        assert_eq!(compute_padded_stride(1920), 7680);
    }
}
