use crate::backend::{
    BackendCapabilities, BackendStats, ContextSignal, FrameRequest, RenderBackend, ShaderProgram,
};
use crate::error::{CarouselError, Result};
use crate::surface::DrawSurface;
use crate::types::{BackendKind, LoadedImage, TextureHandle};

use super::compute::{ComputeTexture, FeedbackBuffer};
use super::context::Flavor;
use super::renderer::GpuRenderer;

/// Full-featured wgpu backend on the platform's primary API (Vulkan, Metal
/// or DX12). Supports custom meshes, instancing, float render targets and
/// storage buffers.
pub struct ModernBackend {
    inner: GpuRenderer,
}

impl ModernBackend {
    pub fn new() -> Self {
        Self {
            inner: GpuRenderer::new(Flavor::Modern),
        }
    }

    /// Allocates a float texture an effect can write from a compute pass.
    pub fn create_compute_texture(&self, width: u32, height: u32) -> Result<ComputeTexture> {
        let device = self.device()?;
        Ok(ComputeTexture::new(device, width, height))
    }

    /// Allocates a buffer of `capacity` floats that compute passes can
    /// write and draws can read back as vertex input.
    pub fn setup_feedback(&self, capacity: usize) -> Result<FeedbackBuffer> {
        let device = self.device()?;
        Ok(FeedbackBuffer::new(device, capacity))
    }

    fn device(&self) -> Result<&wgpu::Device> {
        self.inner
            .device()
            .ok_or_else(|| CarouselError::Surface("modern GPU backend has no live device".into()))
    }
}

impl Default for ModernBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for ModernBackend {
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
    use super::*;

    #[test]
    fn modern_backend_advertises_every_capability() {
        let backend = ModernBackend::new();
        assert_eq!(backend.kind(), BackendKind::ModernGpu);
        let caps = backend.capabilities();
        assert!(caps.shaders && caps.custom_mesh && caps.advanced);
        assert!(!backend.is_initialized());
    }

    #[test]
    fn extras_need_a_live_device() {
        let backend = ModernBackend::new();
        assert!(backend.create_compute_texture(4, 4).is_err());
        assert!(backend.setup_feedback(16).is_err());
    }
}
