use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::error::{CarouselError, Result};
use crate::surface::{Canvas, DrawSurface, PresentTarget};
use crate::types::BackendKind;

use super::readback::OffscreenTarget;

/// Which wgpu configuration a GPU backend runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flavor {
    /// Vulkan, Metal or DX12 with the adapter's full limits.
    Modern,
    /// GL only, restricted to WebGL2-class limits.
    Legacy,
}

impl Flavor {
    pub fn kind(self) -> BackendKind {
        match self {
            Flavor::Modern => BackendKind::ModernGpu,
            Flavor::Legacy => BackendKind::LegacyGpu,
        }
    }

    fn backends(self) -> wgpu::Backends {
        match self {
            Flavor::Modern => wgpu::Backends::PRIMARY,
            Flavor::Legacy => wgpu::Backends::GL,
        }
    }

    fn limits(self, adapter: &wgpu::Adapter) -> wgpu::Limits {
        match self {
            Flavor::Modern => adapter.limits(),
            Flavor::Legacy => {
                wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Flavor::Modern => "carousel modern device",
            Flavor::Legacy => "carousel legacy device",
        }
    }
}

/// Where finished frames go.
pub(crate) enum Presenter {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        // Keeps the window alive for as long as the surface; declared after
        // `surface` so it drops last.
        _target: Arc<dyn PresentTarget>,
    },
    Offscreen(OffscreenTarget),
}

/// A frame being drawn. Window frames must be presented; offscreen frames
/// are read back into the canvas.
pub(crate) enum FrameTarget {
    Surface(wgpu::SurfaceTexture),
    Offscreen,
}

pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub presenter: Presenter,
    pub format: wgpu::TextureFormat,
    pub size: (u32, u32),
    pub max_texture_dimension: u32,
    pub canvas: Canvas,
    pub adapter_name: String,
    lost: Receiver<String>,
}

impl GpuContext {
    pub(crate) fn new(flavor: Flavor, surface: &DrawSurface) -> Result<Self> {
        let unavailable = |message: String| CarouselError::BackendUnavailable {
            backend: flavor.kind(),
            message,
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: flavor.backends(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_surface = match surface.target() {
            Some(target) => {
                let window_handle = target
                    .window_handle()
                    .map_err(|err| unavailable(format!("failed to acquire window handle: {err}")))?;
                let display_handle = target
                    .display_handle()
                    .map_err(|err| unavailable(format!("failed to acquire display handle: {err}")))?;
                let created = unsafe {
                    instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                        raw_display_handle: display_handle.as_raw(),
                        raw_window_handle: window_handle.as_raw(),
                    })
                }
                .map_err(|err| unavailable(format!("failed to create rendering surface: {err}")))?;
                Some((created, Arc::clone(target)))
            }
            None => None,
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: window_surface.as_ref().map(|(surface, _)| surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| unavailable(format!("failed to find a suitable GPU adapter: {err}")))?;

        let adapter_info = adapter.get_info();
        let limits = flavor.limits(&adapter);
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let max_texture_dimension = limits.max_texture_dimension_2d;
        let (width, height) = surface.size();
        if !fits_texture_limit(width, height, max_texture_dimension) {
            return Err(unavailable(format!(
                "GPU max texture dimension is {max_texture_dimension}, requested surface is {width}x{height}"
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(flavor.label()),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| unavailable(format!("failed to create GPU device: {err}")))?;

        let (lost_tx, lost_rx) = crossbeam_channel::bounded(1);
        device.set_device_lost_callback(move |reason, message| {
            if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                return;
            }
            let _ = lost_tx.try_send(format!("{reason:?}: {message}"));
        });

        let (presenter, format) = match window_surface {
            Some((window_surface, target)) => {
                let caps = window_surface.get_capabilities(&adapter);
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|format| !format.is_srgb())
                    .or_else(|| caps.formats.first().copied())
                    .ok_or_else(|| unavailable("surface reports no supported formats".into()))?;
                let present_mode = caps
                    .present_modes
                    .iter()
                    .copied()
                    .find(|mode| *mode == wgpu::PresentMode::Fifo)
                    .unwrap_or(wgpu::PresentMode::AutoVsync);
                let alpha_mode = caps
                    .alpha_modes
                    .first()
                    .copied()
                    .unwrap_or(wgpu::CompositeAlphaMode::Auto);
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width,
                    height,
                    present_mode,
                    alpha_mode,
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                window_surface.configure(&device, &config);
                tracing::debug!(?format, ?present_mode, "configured window surface");
                (
                    Presenter::Window {
                        surface: window_surface,
                        config,
                        _target: target,
                    },
                    format,
                )
            }
            None => {
                let target = OffscreenTarget::new(&device, width, height);
                (Presenter::Offscreen(target), OffscreenTarget::FORMAT)
            }
        };

        Ok(Self {
            _instance: instance,
            device,
            queue,
            presenter,
            format,
            size: (width, height),
            max_texture_dimension,
            canvas: surface.canvas().clone(),
            adapter_name: adapter_info.name,
            lost: lost_rx,
        })
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if !fits_texture_limit(width, height, self.max_texture_dimension) {
            tracing::warn!(
                width,
                height,
                max = self.max_texture_dimension,
                "resize exceeds GPU max texture dimension; keeping {}x{}",
                self.size.0,
                self.size.1
            );
            return;
        }
        self.size = (width, height);
        match &mut self.presenter {
            Presenter::Window {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presenter::Offscreen(target) => {
                *target = OffscreenTarget::new(&self.device, width, height);
            }
        }
        self.canvas.resize(width, height);
    }

    /// Acquires the next frame and a view to draw into.
    pub(crate) fn acquire(&mut self) -> Result<(FrameTarget, wgpu::TextureView)> {
        match &mut self.presenter {
            Presenter::Window {
                surface, config, ..
            } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        tracing::debug!("surface lost or outdated; reconfiguring");
                        surface.configure(&self.device, config);
                        surface
                            .get_current_texture()
                            .map_err(|err| CarouselError::Surface(err.to_string()))?
                    }
                    Err(err) => return Err(CarouselError::Surface(err.to_string())),
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok((FrameTarget::Surface(frame), view))
            }
            Presenter::Offscreen(target) => Ok((FrameTarget::Offscreen, target.view())),
        }
    }

    /// Submits `encoder` and delivers the frame.
    pub(crate) fn finish(&self, mut encoder: wgpu::CommandEncoder, frame: FrameTarget) -> Result<()> {
        match (frame, &self.presenter) {
            (FrameTarget::Surface(texture), _) => {
                self.queue.submit(std::iter::once(encoder.finish()));
                texture.present();
                Ok(())
            }
            (FrameTarget::Offscreen, Presenter::Offscreen(target)) => {
                target.encode_copy(&mut encoder);
                self.queue.submit(std::iter::once(encoder.finish()));
                target.read_into(&self.device, &self.canvas)
            }
            (FrameTarget::Offscreen, Presenter::Window { .. }) => {
                self.queue.submit(std::iter::once(encoder.finish()));
                Ok(())
            }
        }
    }

    /// Reason string if the device reported loss since the last call.
    pub(crate) fn take_loss(&self) -> Option<String> {
        match self.lost.try_recv() {
            Ok(reason) => Some(reason),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

fn fits_texture_limit(width: u32, height: u32, max: u32) -> bool {
    width <= max && height <= max
}

#[cfg(test)]
mod tests {
    use super::fits_texture_limit;

    #[test]
    fn texture_limit_is_inclusive_per_axis() {
        assert!(fits_texture_limit(2048, 2048, 2048));
        assert!(fits_texture_limit(1, 1, 2048));
        assert!(!fits_texture_limit(2049, 10, 2048));
        assert!(!fits_texture_limit(10, 8192, 2048));
    }
}
