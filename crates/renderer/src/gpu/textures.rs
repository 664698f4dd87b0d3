use std::collections::HashMap;

use image::imageops::{self, FilterType};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::types::{LoadedImage, TextureHandle};

pub(crate) struct GpuTexture {
    pub view: wgpu::TextureView,
    /// Natural size of the source image, used for cover-fit sampling.
    pub width: u32,
    pub height: u32,
    _texture: wgpu::Texture,
}

impl GpuTexture {
    /// Uploads `image` as an sRGB-agnostic RGBA8 texture. Images larger than
    /// the device limit are downscaled to fit, keeping their aspect ratio.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &LoadedImage,
        max_dimension: u32,
    ) -> Self {
        let (width, height) = image.bitmap.dimensions();
        let downscaled;
        let pixels = if width > max_dimension || height > max_dimension {
            let scale = max_dimension as f32 / width.max(height) as f32;
            let target_width = ((width as f32 * scale).floor() as u32).max(1);
            let target_height = ((height as f32 * scale).floor() as u32).max(1);
            tracing::warn!(
                url = %image.url,
                width,
                height,
                max_dimension,
                "image exceeds GPU texture limit; downscaling"
            );
            downscaled = imageops::resize(
                &*image.bitmap,
                target_width,
                target_height,
                FilterType::Triangle,
            );
            &downscaled
        } else {
            &*image.bitmap
        };

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("carousel image {}", image.url)),
                size: wgpu::Extent3d {
                    width: pixels.width(),
                    height: pixels.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            view,
            width,
            height,
            _texture: texture,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Clamp-to-edge, linear filtering; shared by every texture slot.
pub(crate) fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("carousel image sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// URL-keyed texture cache. Handles carry the store generation; bumping it
/// invalidates every handle issued before.
#[derive(Default)]
pub(crate) struct TextureStore {
    textures: HashMap<u64, GpuTexture>,
    by_url: HashMap<String, TextureHandle>,
    next_id: u64,
    generation: u32,
}

impl TextureStore {
    pub fn cached(&self, url: &str) -> Option<TextureHandle> {
        self.by_url
            .get(url)
            .copied()
            .filter(|handle| self.get(*handle).is_some())
    }

    pub fn insert(&mut self, url: &str, texture: GpuTexture) -> TextureHandle {
        self.next_id += 1;
        let handle = TextureHandle::new(self.next_id, self.generation);
        self.textures.insert(handle.id, texture);
        self.by_url.insert(url.to_string(), handle);
        handle
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        if handle.generation != self.generation {
            return None;
        }
        self.textures.get(&handle.id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.by_url.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Continues numbering from a previous store so handles from a lost
    /// context never collide with new ones.
    pub fn resume_after(generation: u32, next_id: u64) -> Self {
        Self {
            generation: generation.wrapping_add(1),
            next_id,
            ..Self::default()
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}
