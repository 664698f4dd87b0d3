use crate::backend::{
    BackendCapabilities, BackendStats, ContextSignal, FrameRequest, RenderBackend, ShaderProgram,
};
use crate::error::Result;
use crate::surface::DrawSurface;
use crate::types::{BackendKind, LoadedImage, TextureHandle};

use super::context::Flavor;
use super::renderer::GpuRenderer;

/// wgpu on its GL backend with WebGL2-class limits. Runs the same shader
/// programs as the modern backend but always draws the full-surface quad.
pub struct LegacyBackend {
    inner: GpuRenderer,
}

impl LegacyBackend {
    pub fn new() -> Self {
        Self {
            inner: GpuRenderer::new(Flavor::Legacy),
        }
    }
}

impl Default for LegacyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.inner.capabilities()
    }

    fn initialize(&mut self, surface: &DrawSurface) -> Result<()> {
        self.inner.initialize(surface)
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn set_effect(&mut self, program: &ShaderProgram) -> Result<()> {
        self.inner.set_effect(program)
    }

    fn load_texture(&mut self, image: &LoadedImage) -> Option<TextureHandle> {
        self.inner.load_texture(image)
    }

    fn render(&mut self, frame: &FrameRequest<'_>) -> Result<()> {
        self.inner.render(frame)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.inner.resize(width, height);
    }

    fn release_textures(&mut self) {
        self.inner.release_textures();
    }

    fn poll_signal(&mut self) -> Option<ContextSignal> {
        self.inner.poll_signal()
    }

    fn stats(&self) -> BackendStats {
        self.inner.stats()
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::CarouselError;
    use effects::catalog;

    #[test]
    fn legacy_backend_is_shader_only() {
        let backend = LegacyBackend::new();
        assert_eq!(backend.kind(), BackendKind::LegacyGpu);
        let caps = backend.capabilities();
        assert!(caps.shaders);
        assert!(!caps.custom_mesh);
        assert!(!caps.advanced);
    }

    #[test]
    fn mesh_programs_are_refused_with_baseline_fallback() {
        let mut backend = LegacyBackend::new();
        let mut program = ShaderProgram::from_effect(&catalog::crossfade());
        program.mesh = Some(Arc::new(catalog::tile_mesh(2, 2)));
        match backend.set_effect(&program) {
            Err(CarouselError::UnsupportedEffectCapability { fallback, backend, .. }) => {
                assert_eq!(fallback, effects::BASELINE_EFFECT);
                assert_eq!(backend, BackendKind::LegacyGpu);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
