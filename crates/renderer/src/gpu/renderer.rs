use std::time::{Duration, Instant};

use effects::{EffectError, BASELINE_EFFECT};

use crate::backend::{
    BackendCapabilities, BackendStats, ContextSignal, FrameRequest, ShaderProgram,
};
use crate::compile::prepare_program;
use crate::error::{CarouselError, Result};
use crate::surface::DrawSurface;
use crate::types::{BackendKind, LoadedImage, TextureHandle};

use super::context::{Flavor, GpuContext};
use super::mesh::{self, MeshBuffers};
use super::pipeline::{self, EffectProgram, Geometry, PipelineLayouts};
use super::textures::{self, GpuTexture, TextureStore};
use super::uniforms::FrameUniforms;

const RESTORE_RETRY: Duration = Duration::from_secs(1);

/// Everything tied to one live device. Dropping it releases the lot.
struct GpuState {
    context: GpuContext,
    layouts: PipelineLayouts,
    frame_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    textures: TextureStore,
    program: Option<EffectProgram>,
    mesh: Option<MeshBuffers>,
    bound: Option<(TextureHandle, TextureHandle, wgpu::BindGroup)>,
}

impl GpuState {
    fn new(flavor: Flavor, surface: &DrawSurface, textures: TextureStore) -> Result<Self> {
        let context = GpuContext::new(flavor, surface)?;
        let layouts = PipelineLayouts::new(&context.device);
        let frame_buffer = pipeline::create_frame_buffer(&context.device);
        let sampler = textures::create_sampler(&context.device);
        let quad = mesh::create_quad_buffer(&context.device);
        tracing::info!(adapter = %context.adapter_name, ?flavor, "GPU context ready");
        Ok(Self {
            context,
            layouts,
            frame_buffer,
            sampler,
            quad,
            textures,
            program: None,
            mesh: None,
            bound: None,
        })
    }
}

/// Shared implementation behind the modern and legacy wgpu backends.
pub(crate) struct GpuRenderer {
    flavor: Flavor,
    surface: Option<DrawSurface>,
    state: Option<GpuState>,
    lost: bool,
    next_restore: Option<Instant>,
    retired: (u32, u64),
    stats: BackendStats,
}

impl GpuRenderer {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            surface: None,
            state: None,
            lost: false,
            next_restore: None,
            retired: (0, 0),
            stats: BackendStats::default(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.flavor.kind()
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        match self.flavor {
            Flavor::Modern => BackendCapabilities {
                shaders: true,
                custom_mesh: true,
                advanced: true,
            },
            Flavor::Legacy => BackendCapabilities {
                shaders: true,
                custom_mesh: false,
                advanced: false,
            },
        }
    }

    pub fn device(&self) -> Option<&wgpu::Device> {
        self.state.as_ref().map(|state| &state.context.device)
    }

    pub fn initialize(&mut self, surface: &DrawSurface) -> Result<()> {
        self.dispose();
        let store = TextureStore::resume_after(self.retired.0, self.retired.1);
        self.state = Some(GpuState::new(self.flavor, surface, store)?);
        self.surface = Some(surface.clone());
        if let Err(err) = self.install_bootstrap() {
            self.dispose();
            return Err(CarouselError::BackendUnavailable {
                backend: self.kind(),
                message: format!("bootstrap effect failed: {err}"),
            });
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    fn install_bootstrap(&mut self) -> Result<()> {
        self.set_effect(&ShaderProgram::from_effect(&effects::catalog::crossfade()))
    }

    pub fn set_effect(&mut self, program: &ShaderProgram) -> Result<()> {
        if program.mesh.is_some() && !self.capabilities().custom_mesh {
            return Err(CarouselError::UnsupportedEffectCapability {
                effect: program.name.clone(),
                backend: self.kind(),
                fallback: BASELINE_EFFECT.to_string(),
            });
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CarouselError::Surface("GPU context is not available".into()))?;

        let prepared = prepare_program(&program.name, &program.vertex, &program.fragment)?;
        let mesh = program
            .mesh
            .as_deref()
            .map(|data| MeshBuffers::new(&state.context.device, data))
            .transpose()
            .map_err(|message| CarouselError::Effect(EffectError::Validation(message)))?;
        let geometry = if mesh.is_some() {
            Geometry::Mesh
        } else {
            Geometry::Quad
        };
        let linked = EffectProgram::link(
            &state.context.device,
            &state.layouts,
            &state.frame_buffer,
            state.context.format,
            &program.name,
            prepared,
            geometry,
        )?;

        tracing::debug!(
            effect = %program.name,
            parameters = linked.layout.slots().len(),
            ?geometry,
            "installed effect program"
        );
        state.program = Some(linked);
        state.mesh = mesh;
        Ok(())
    }

    pub fn load_texture(&mut self, image: &LoadedImage) -> Option<TextureHandle> {
        let state = self.state.as_mut()?;
        if let Some(handle) = state.textures.cached(&image.url) {
            return Some(handle);
        }
        let texture = GpuTexture::upload(
            &state.context.device,
            &state.context.queue,
            image,
            state.context.max_texture_dimension,
        );
        let handle = state.textures.insert(&image.url, texture);
        self.stats.uploads += 1;
        self.stats.textures = state.textures.len();
        Some(handle)
    }

    pub fn render(&mut self, frame: &FrameRequest<'_>) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            if self.lost {
                return Ok(());
            }
            return Err(CarouselError::Surface("GPU backend is not initialised".into()));
        };
        let GpuState {
            context,
            layouts,
            frame_buffer,
            sampler,
            quad,
            textures,
            program,
            mesh,
            bound,
        } = state;

        let Some(current) = frame.current.filter(|handle| textures.get(*handle).is_some()) else {
            return Ok(());
        };
        let next = frame
            .next
            .filter(|handle| textures.get(*handle).is_some())
            .unwrap_or(current);
        let (Some(current_texture), Some(next_texture)) = (textures.get(current), textures.get(next))
        else {
            return Ok(());
        };
        let program = program
            .as_ref()
            .ok_or_else(|| CarouselError::Surface("no effect program installed".into()))?;

        let uniforms = FrameUniforms::new(
            context.size,
            frame.progress,
            current_texture.size(),
            next_texture.size(),
        );
        context
            .queue
            .write_buffer(frame_buffer, 0, bytemuck::bytes_of(&uniforms));
        context
            .queue
            .write_buffer(&program.params_buffer, 0, &program.layout.pack(frame.parameters));

        let reuse = matches!(bound, Some((c, n, _)) if *c == current && *n == next);
        if !reuse {
            let group = pipeline::create_texture_bind_group(
                &context.device,
                layouts,
                sampler,
                &current_texture.view,
                &next_texture.view,
            );
            *bound = Some((current, next, group));
        }
        let Some((_, _, texture_group)) = bound.as_ref() else {
            return Ok(());
        };

        let (target, view) = context.acquire()?;
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("carousel frame encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("carousel frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, texture_group, &[]);
            match (program.geometry, mesh.as_ref()) {
                (Geometry::Mesh, Some(mesh)) => {
                    render_pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                    render_pass.set_vertex_buffer(1, mesh.instances.slice(..));
                    render_pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, 0..mesh.instance_count);
                }
                _ => {
                    render_pass.set_vertex_buffer(0, quad.slice(..));
                    render_pass.draw(0..4, 0..1);
                }
            }
        }
        context.finish(encoder, target)?;
        self.stats.draws += 1;
        tracing::trace!(progress = frame.progress, effect = %program.name, "drew frame");
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.set_size(width, height);
        }
        if let Some(state) = self.state.as_mut() {
            state.context.resize(width.max(1), height.max(1));
        }
    }

    pub fn release_textures(&mut self) {
        if let Some(state) = self.state.as_mut() {
            tracing::debug!(count = state.textures.len(), "releasing GPU textures");
            state.bound = None;
            state.textures.clear();
        }
        self.stats.textures = 0;
    }

    /// Reports device loss once, then keeps trying to rebuild the context
    /// and reports restoration when it succeeds.
    pub fn poll_signal(&mut self) -> Option<ContextSignal> {
        if let Some(state) = &self.state {
            let reason = state.context.take_loss()?;
            tracing::warn!(%reason, backend = %self.kind(), "GPU device lost");
            self.retired = (state.textures.generation(), state.textures.next_id());
            self.state = None;
            self.lost = true;
            self.stats.textures = 0;
            self.next_restore = None;
            return Some(ContextSignal::Lost);
        }
        if !self.lost {
            return None;
        }

        let now = Instant::now();
        if self.next_restore.is_some_and(|at| now < at) {
            return None;
        }
        let surface = self.surface.clone()?;
        let store = TextureStore::resume_after(self.retired.0, self.retired.1);
        match GpuState::new(self.flavor, &surface, store) {
            Ok(state) => {
                self.state = Some(state);
                self.lost = false;
                self.next_restore = None;
                if let Err(err) = self.install_bootstrap() {
                    tracing::error!(%err, "failed to reinstall bootstrap effect after restore");
                }
                Some(ContextSignal::Restored)
            }
            Err(err) => {
                tracing::debug!(%err, "GPU context restore failed; retrying");
                self.next_restore = Some(now + RESTORE_RETRY);
                None
            }
        }
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    pub fn dispose(&mut self) {
        if let Some(state) = self.state.take() {
            self.retired = (state.textures.generation(), state.textures.next_id());
            tracing::debug!(backend = %self.kind(), "disposing GPU backend");
        }
        self.surface = None;
        self.lost = false;
        self.next_restore = None;
        self.stats.textures = 0;
    }
}
