//! CPU compositing fallback.
//!
//! Draws onto the surface's [`Canvas`] with per-draw global alpha: the
//! current image at `1 - progress`, then the next at `progress`, both
//! letterboxed with [`contain_rect`]. Effects are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::backend::{BackendCapabilities, BackendStats, FrameRequest, RenderBackend, ShaderProgram};
use crate::error::{CarouselError, Result};
use crate::fit::contain_rect;
use crate::surface::{Canvas, DrawSurface};
use crate::types::{BackendKind, LoadedImage, TextureHandle};

struct RasterTexture {
    url: String,
    bitmap: Arc<RgbaImage>,
    scaled: HashMap<(u32, u32), RgbaImage>,
}

impl RasterTexture {
    fn scaled(&mut self, width: u32, height: u32) -> &RgbaImage {
        let bitmap = &self.bitmap;
        self.scaled.entry((width, height)).or_insert_with(|| {
            if bitmap.dimensions() == (width, height) {
                (**bitmap).clone()
            } else {
                imageops::resize(&**bitmap, width, height, FilterType::Triangle)
            }
        })
    }
}

#[derive(Default)]
pub struct RasterBackend {
    canvas: Option<Canvas>,
    size: (u32, u32),
    textures: HashMap<u64, RasterTexture>,
    by_url: HashMap<String, TextureHandle>,
    next_id: u64,
    generation: u32,
    effect_name: Option<String>,
    stats: BackendStats,
}

impl RasterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the last effect handed to `set_effect`; drawing ignores it.
    pub fn effect_name(&self) -> Option<&str> {
        self.effect_name.as_deref()
    }

    fn is_live(&self, handle: TextureHandle) -> bool {
        handle.generation == self.generation && self.textures.contains_key(&handle.id)
    }

    fn composite(&mut self, canvas: &Canvas, handle: TextureHandle, alpha: f32) {
        let (width, height) = self.size;
        let Some(texture) = self.textures.get_mut(&handle.id) else {
            return;
        };
        let rect = contain_rect(texture.bitmap.dimensions(), (width, height));
        let (x, y, draw_width, draw_height) = rect.to_pixels();
        let scaled = texture.scaled(draw_width, draw_height);
        canvas.with_pixels_mut(|pixels| blend_onto(pixels, scaled, x, y, alpha));
    }
}

impl RenderBackend for RasterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Raster
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn initialize(&mut self, surface: &DrawSurface) -> Result<()> {
        self.canvas = Some(surface.canvas().clone());
        self.size = surface.size();
        tracing::debug!(width = self.size.0, height = self.size.1, "raster backend ready");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.canvas.is_some()
    }

    fn set_effect(&mut self, program: &ShaderProgram) -> Result<()> {
        self.effect_name = Some(program.name.clone());
        Ok(())
    }

    fn load_texture(&mut self, image: &LoadedImage) -> Option<TextureHandle> {
        if !self.is_initialized() {
            return None;
        }
        if let Some(handle) = self.by_url.get(&image.url) {
            if self.is_live(*handle) {
                return Some(*handle);
            }
        }
        self.next_id += 1;
        let handle = TextureHandle::new(self.next_id, self.generation);
        self.textures.insert(
            handle.id,
            RasterTexture {
                url: image.url.clone(),
                bitmap: Arc::clone(&image.bitmap),
                scaled: HashMap::new(),
            },
        );
        self.by_url.insert(image.url.clone(), handle);
        self.stats.uploads += 1;
        self.stats.textures = self.textures.len();
        Some(handle)
    }

    fn render(&mut self, frame: &FrameRequest<'_>) -> Result<()> {
        let canvas = self
            .canvas
            .clone()
            .ok_or_else(|| CarouselError::Surface("raster backend is not initialised".into()))?;
        let Some(current) = frame.current.filter(|handle| self.is_live(*handle)) else {
            return Ok(());
        };
        let next = frame.next.filter(|handle| self.is_live(*handle));

        canvas.with_pixels_mut(|pixels| {
            for pixel in pixels.pixels_mut() {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        });

        let progress = frame.progress.clamp(0.0, 1.0);
        match next {
            Some(next) => {
                if progress < 1.0 {
                    self.composite(&canvas, current, 1.0 - progress);
                }
                if progress > 0.0 {
                    self.composite(&canvas, next, progress);
                }
            }
            None => self.composite(&canvas, current, 1.0),
        }
        self.stats.draws += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
        if let Some(canvas) = &self.canvas {
            canvas.resize(self.size.0, self.size.1);
        }
        for texture in self.textures.values_mut() {
            texture.scaled.clear();
        }
    }

    fn release_textures(&mut self) {
        tracing::debug!(count = self.textures.len(), "releasing raster textures");
        self.textures.clear();
        self.by_url.clear();
        self.generation = self.generation.wrapping_add(1);
        self.stats.textures = 0;
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn dispose(&mut self) {
        if self.canvas.is_none() && self.textures.is_empty() {
            return;
        }
        self.release_textures();
        self.canvas = None;
        self.effect_name = None;
    }
}

impl std::fmt::Debug for RasterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBackend")
            .field("size", &self.size)
            .field(
                "textures",
                &self.textures.values().map(|t| t.url.as_str()).collect::<Vec<_>>(),
            )
            .field("generation", &self.generation)
            .finish()
    }
}

/// Non-premultiplied source-over with a global alpha.
fn blend_onto(canvas: &mut RgbaImage, source: &RgbaImage, x: i64, y: i64, alpha: f32) {
    let (canvas_width, canvas_height) = canvas.dimensions();
    for (sx, sy, src) in source.enumerate_pixels() {
        let cx = x + i64::from(sx);
        let cy = y + i64::from(sy);
        if cx < 0 || cy < 0 || cx >= i64::from(canvas_width) || cy >= i64::from(canvas_height) {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
        let src_a = f32::from(src[3]) / 255.0 * alpha;
        if src_a <= 0.0 {
            continue;
        }
        let dst_a = f32::from(dst[3]) / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        for channel in 0..3 {
            let blended = (f32::from(src[channel]) * src_a
                + f32::from(dst[channel]) * dst_a * (1.0 - src_a))
                / out_a;
            dst[channel] = blended.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use effects::EffectParameters;

    fn solid(url: &str, width: u32, height: u32, rgba: [u8; 4]) -> LoadedImage {
        LoadedImage::new(url, RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    fn ready(width: u32, height: u32) -> (RasterBackend, DrawSurface) {
        let surface = DrawSurface::offscreen(width, height);
        let mut backend = RasterBackend::new();
        backend.initialize(&surface).unwrap();
        (backend, surface)
    }

    #[test]
    fn texture_cache_is_idempotent() {
        let (mut backend, _surface) = ready(4, 4);
        let image = solid("a.png", 2, 2, [255, 0, 0, 255]);
        let first = backend.load_texture(&image).unwrap();
        let second = backend.load_texture(&image).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.stats().uploads, 1);
        assert_eq!(backend.stats().textures, 1);
    }

    #[test]
    fn steady_frame_letterboxes() {
        let (mut backend, surface) = ready(4, 2);
        let handle = backend
            .load_texture(&solid("a.png", 2, 2, [255, 0, 0, 255]))
            .unwrap();
        let params = EffectParameters::new();
        backend.render(&FrameRequest::steady(Some(handle), &params)).unwrap();

        let pixels = surface.canvas().snapshot();
        assert_eq!(pixels.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(pixels.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(2, 1).0, [255, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(3, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn blend_endpoints_show_single_image() {
        let (mut backend, surface) = ready(2, 2);
        let red = backend
            .load_texture(&solid("red.png", 2, 2, [255, 0, 0, 255]))
            .unwrap();
        let blue = backend
            .load_texture(&solid("blue.png", 2, 2, [0, 0, 255, 255]))
            .unwrap();
        let params = EffectParameters::new();

        for (progress, expected) in [(0.0, [255, 0, 0, 255]), (1.0, [0, 0, 255, 255])] {
            backend
                .render(&FrameRequest {
                    current: Some(red),
                    next: Some(blue),
                    progress,
                    parameters: &params,
                })
                .unwrap();
            assert_eq!(surface.canvas().snapshot().get_pixel(0, 0).0, expected);
        }

        backend
            .render(&FrameRequest {
                current: Some(red),
                next: Some(blue),
                progress: 0.5,
                parameters: &params,
            })
            .unwrap();
        let mid = surface.canvas().snapshot().get_pixel(1, 1).0;
        assert!(mid[0] > 0 && mid[2] > 0, "{mid:?}");
        assert!(mid[2] > mid[0]);
    }

    #[test]
    fn released_handles_are_rejected() {
        let (mut backend, surface) = ready(2, 2);
        let handle = backend
            .load_texture(&solid("a.png", 2, 2, [9, 9, 9, 255]))
            .unwrap();
        backend.release_textures();
        surface
            .canvas()
            .with_pixels_mut(|pixels| pixels.put_pixel(0, 0, Rgba([1, 2, 3, 4])));

        let params = EffectParameters::new();
        backend.render(&FrameRequest::steady(Some(handle), &params)).unwrap();
        assert_eq!(surface.canvas().snapshot().get_pixel(0, 0).0, [1, 2, 3, 4]);
        assert_eq!(backend.stats().draws, 0);

        let fresh = backend
            .load_texture(&solid("a.png", 2, 2, [9, 9, 9, 255]))
            .unwrap();
        assert_ne!(fresh, handle);
        assert_eq!(backend.stats().uploads, 2);
    }

    #[test]
    fn dispose_is_idempotent() {
        let (mut backend, _surface) = ready(2, 2);
        backend.load_texture(&solid("a.png", 1, 1, [0, 0, 0, 255]));
        backend.dispose();
        backend.dispose();
        assert!(!backend.is_initialized());
        assert!(backend
            .load_texture(&solid("a.png", 1, 1, [0, 0, 0, 255]))
            .is_none());
    }
}
