use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

use crate::timeline::Easing;

/// The three interchangeable backends, in probing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    ModernGpu,
    LegacyGpu,
    Raster,
}

impl BackendKind {
    pub fn is_accelerated(self) -> bool {
        !matches!(self, BackendKind::Raster)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::ModernGpu => f.write_str("modern-gpu"),
            BackendKind::LegacyGpu => f.write_str("legacy-gpu"),
            BackendKind::Raster => f.write_str("raster"),
        }
    }
}

/// Where backend probing starts. `Auto` walks the full list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendPreference {
    #[default]
    Auto,
    Modern,
    Legacy,
    Raster,
}

impl BackendPreference {
    /// Candidates to probe, honouring whether the raster fallback is allowed.
    pub fn candidates(self, allow_raster_fallback: bool) -> Vec<BackendKind> {
        let mut kinds = match self {
            BackendPreference::Auto => vec![
                BackendKind::ModernGpu,
                BackendKind::LegacyGpu,
                BackendKind::Raster,
            ],
            BackendPreference::Modern => vec![BackendKind::ModernGpu],
            BackendPreference::Legacy => vec![BackendKind::LegacyGpu],
            BackendPreference::Raster => return vec![BackendKind::Raster],
        };
        if !allow_raster_fallback {
            kinds.retain(|kind| *kind != BackendKind::Raster);
        }
        kinds
    }
}

/// Construction options for a carousel instance.
#[derive(Clone, Debug)]
pub struct CarouselOptions {
    pub images: Vec<String>,
    pub effect: String,
    pub autoplay: bool,
    pub autoplay_interval: Duration,
    pub transition_duration: Duration,
    pub loop_enabled: bool,
    pub allow_raster_fallback: bool,
    pub start_index: usize,
    pub easing: Easing,
    pub backend: BackendPreference,
    pub decode_timeout: Duration,
}

impl Default for CarouselOptions {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            effect: effects::BASELINE_EFFECT.to_string(),
            autoplay: false,
            autoplay_interval: Duration::from_secs(5),
            transition_duration: Duration::from_secs(1),
            loop_enabled: true,
            allow_raster_fallback: true,
            start_index: 0,
            easing: Easing::Linear,
            backend: BackendPreference::Auto,
            decode_timeout: crate::loader::DEFAULT_DECODE_TIMEOUT,
        }
    }
}

/// A decoded image. Placeholders stand in for failed decodes.
#[derive(Clone)]
pub struct LoadedImage {
    pub url: String,
    pub bitmap: Arc<RgbaImage>,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    pub placeholder: bool,
}

impl LoadedImage {
    pub fn new(url: impl Into<String>, bitmap: RgbaImage) -> Self {
        let (width, height) = bitmap.dimensions();
        Self {
            url: url.into(),
            bitmap: Arc::new(bitmap),
            width,
            height,
            aspect_ratio: width as f32 / height.max(1) as f32,
            placeholder: false,
        }
    }

    /// 1x1 fully transparent bitmap.
    pub fn placeholder(url: impl Into<String>) -> Self {
        let mut image = Self::new(url, RgbaImage::new(1, 1));
        image.placeholder = true;
        image
    }
}

impl fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedImage")
            .field("url", &self.url)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

/// Opaque reference to backend-owned texture data.
///
/// The generation ties a handle to the context that created it; handles from
/// an older generation are rejected after a context loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub(crate) id: u64,
    pub(crate) generation: u32,
}

impl TextureHandle {
    pub fn new(id: u64, generation: u32) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_transparent_pixel() {
        let image = LoadedImage::placeholder("broken.png");
        assert!(image.placeholder);
        assert_eq!((image.width, image.height), (1, 1));
        assert_eq!(image.bitmap.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert!((image.aspect_ratio - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn preference_controls_probe_order() {
        assert_eq!(
            BackendPreference::Auto.candidates(true),
            vec![
                BackendKind::ModernGpu,
                BackendKind::LegacyGpu,
                BackendKind::Raster
            ]
        );
        assert_eq!(
            BackendPreference::Auto.candidates(false),
            vec![BackendKind::ModernGpu, BackendKind::LegacyGpu]
        );
        assert_eq!(
            BackendPreference::Raster.candidates(false),
            vec![BackendKind::Raster]
        );
    }
}
