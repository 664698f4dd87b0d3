use std::sync::Arc;

use effects::{EffectDefinition, EffectParameters, MeshData};

use crate::error::Result;
use crate::surface::DrawSurface;
use crate::types::{BackendKind, LoadedImage, TextureHandle};

/// What a backend can draw beyond the baseline crossfade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub shaders: bool,
    pub custom_mesh: bool,
    pub advanced: bool,
}

/// Context notifications a backend reports through `poll_signal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextSignal {
    Lost,
    Restored,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub textures: usize,
    pub uploads: u64,
    pub draws: u64,
}

/// Shader pair and optional geometry for one effect.
#[derive(Clone, Debug)]
pub struct ShaderProgram {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
    pub mesh: Option<Arc<MeshData>>,
}

impl ShaderProgram {
    pub fn from_effect(effect: &EffectDefinition) -> Self {
        Self {
            name: effect.name().to_string(),
            vertex: effect.vertex_source().to_string(),
            fragment: effect.fragment_source().to_string(),
            mesh: effect.mesh().cloned(),
        }
    }
}

/// Everything needed to draw one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameRequest<'a> {
    pub current: Option<TextureHandle>,
    pub next: Option<TextureHandle>,
    pub progress: f32,
    pub parameters: &'a EffectParameters,
}

impl<'a> FrameRequest<'a> {
    /// A steady frame showing only `current`.
    pub fn steady(current: Option<TextureHandle>, parameters: &'a EffectParameters) -> Self {
        Self {
            current,
            next: None,
            progress: 0.0,
            parameters,
        }
    }
}

/// One of the interchangeable drawing strategies behind a carousel.
///
/// Backends own every resource they create. Handles returned by
/// `load_texture` stay valid until `release_textures`, `dispose`, or a
/// context loss, after which they are rejected rather than dereferenced.
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> BackendCapabilities;

    /// Acquires the device/context for `surface`. On failure the backend
    /// must release anything it partially created.
    fn initialize(&mut self, surface: &DrawSurface) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Installs a program. The previous program stays active on failure.
    fn set_effect(&mut self, program: &ShaderProgram) -> Result<()>;

    /// Uploads `image` once; later calls with the same URL return the cached
    /// handle.
    fn load_texture(&mut self, image: &LoadedImage) -> Option<TextureHandle>;

    fn render(&mut self, frame: &FrameRequest<'_>) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32);

    /// Drops every texture and cache entry while keeping the context.
    fn release_textures(&mut self);

    /// Drains at most one pending context notification.
    fn poll_signal(&mut self) -> Option<ContextSignal> {
        None
    }

    fn stats(&self) -> BackendStats;

    /// Releases everything. Safe to call more than once.
    fn dispose(&mut self);
}

/// Builds a fresh backend of a given kind; the orchestrator probes these in
/// order.
pub type BackendFactory = Box<dyn Fn(BackendKind) -> Option<Box<dyn RenderBackend>>>;

pub fn default_backend(kind: BackendKind) -> Box<dyn RenderBackend> {
    match kind {
        BackendKind::ModernGpu => Box::new(crate::gpu::ModernBackend::new()),
        BackendKind::LegacyGpu => Box::new(crate::gpu::LegacyBackend::new()),
        BackendKind::Raster => Box::new(crate::raster::RasterBackend::new()),
    }
}
