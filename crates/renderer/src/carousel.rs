//! The render orchestrator.
//!
//! `Carousel` ties one backend, the playback state machine, the image loader
//! and an event bus into a single-threaded frame loop. Hosts call `tick` once
//! per frame (or whenever `next_deadline` passes) and forward navigation and
//! resize input; everything observable comes back through `subscribe`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use effects::{catalog, EffectDefinition, EffectError, EffectParameters, EffectRegistry, BASELINE_EFFECT};
use playback::{Playback, PlaybackConfig, PlaybackEvent, Rejected};

use crate::backend::{default_backend, BackendFactory, ContextSignal, FrameRequest, RenderBackend, ShaderProgram};
use crate::clock::{BoxedClock, SystemClock};
use crate::error::{CarouselError, Result};
use crate::events::{CarouselEvent, EventBus};
use crate::loader::{DecodingLoader, ImageLoader, LoadProgress};
use crate::surface::DrawSurface;
use crate::timeline::TransitionClock;
use crate::types::{BackendKind, CarouselOptions, LoadedImage, TextureHandle};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// How often a host should tick while waiting for a lost context to return.
const RESTORE_POLL: Duration = Duration::from_millis(250);

struct ActiveTransition {
    from: usize,
    to: usize,
    effect: Arc<EffectDefinition>,
    clock: TransitionClock,
}

pub struct CarouselBuilder {
    options: CarouselOptions,
    surface: DrawSurface,
    factory: Option<BackendFactory>,
    loader: Option<Arc<dyn ImageLoader>>,
    clock: Option<BoxedClock>,
    registry: Option<EffectRegistry>,
}

impl CarouselBuilder {
    /// Replaces the backend constructor used while probing.
    pub fn backends(mut self, factory: BackendFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn clock(mut self, clock: BoxedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn registry(mut self, registry: EffectRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Carousel {
        let options = self.options;
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!("carousel", instance);
        let playback = Playback::new(PlaybackConfig {
            image_count: options.images.len(),
            start_index: options.start_index,
            effect: options.effect.clone(),
            transition_duration: options.transition_duration,
            autoplay_interval: options.autoplay_interval,
            loop_enabled: options.loop_enabled,
        });
        let loader: Arc<dyn ImageLoader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(DecodingLoader::new(options.decode_timeout)),
        };
        let factory: BackendFactory = match self.factory {
            Some(factory) => factory,
            None => Box::new(|kind| Some(default_backend(kind))),
        };
        let clock: BoxedClock = match self.clock {
            Some(clock) => clock,
            None => Box::new(SystemClock),
        };
        Carousel {
            surface: self.surface,
            factory,
            loader,
            clock,
            registry: self.registry.unwrap_or_default(),
            backend: None,
            backend_span: tracing::Span::none(),
            playback,
            images: Vec::new(),
            textures: HashMap::new(),
            active: None,
            installed: None,
            bus: EventBus::default(),
            span,
            ready: false,
            disposed: false,
            context_lost: false,
            options,
        }
    }
}

/// One image carousel bound to one drawing surface.
pub struct Carousel {
    options: CarouselOptions,
    surface: DrawSurface,
    factory: BackendFactory,
    loader: Arc<dyn ImageLoader>,
    clock: BoxedClock,
    registry: EffectRegistry,
    backend: Option<Box<dyn RenderBackend>>,
    backend_span: tracing::Span,
    playback: Playback,
    images: Vec<Arc<LoadedImage>>,
    textures: HashMap<usize, TextureHandle>,
    active: Option<ActiveTransition>,
    installed: Option<Arc<EffectDefinition>>,
    bus: EventBus,
    span: tracing::Span,
    ready: bool,
    disposed: bool,
    context_lost: bool,
}

impl Carousel {
    pub fn builder(options: CarouselOptions, surface: DrawSurface) -> CarouselBuilder {
        CarouselBuilder {
            options,
            surface,
            factory: None,
            loader: None,
            clock: None,
            registry: None,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<CarouselEvent> {
        self.bus.subscribe()
    }

    /// Selects a backend, preloads every image and arms autoplay.
    ///
    /// Only a failure to acquire any backend is returned; image and effect
    /// problems are reported as `Error` events.
    pub fn initialize(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _guard = span.enter();
        if self.disposed {
            return Err(CarouselError::InitializationFailure(
                "carousel has been disposed".into(),
            ));
        }
        if self.ready {
            return Ok(());
        }

        let kind = self.acquire_backend()?;
        let baseline = self.baseline();
        self.install_effect(baseline);
        self.preload();

        let now = self.clock.now();
        if self.options.autoplay {
            if let Some(event) = self.playback.set_playing(true, now) {
                self.handle_playback(event, now);
            }
        }
        self.ready = true;
        tracing::info!(backend = %kind, images = self.images.len(), "carousel ready");
        self.bus.publish(CarouselEvent::Ready { backend: kind });
        Ok(())
    }

    fn acquire_backend(&mut self) -> Result<BackendKind> {
        let candidates = self
            .options
            .backend
            .candidates(self.options.allow_raster_fallback);
        let mut failures = Vec::new();
        for kind in candidates {
            let Some(mut backend) = (self.factory)(kind) else {
                tracing::debug!(backend = %kind, "backend not available in this build");
                continue;
            };
            let span = tracing::info_span!(parent: &self.span, "backend", kind = %kind);
            let result = span.in_scope(|| backend.initialize(&self.surface));
            match result {
                Ok(()) => {
                    tracing::info!(backend = %kind, "selected rendering backend");
                    self.backend = Some(backend);
                    self.backend_span = span;
                    return Ok(kind);
                }
                Err(err) => {
                    tracing::warn!(backend = %kind, %err, "backend failed to initialise; trying next");
                    backend.dispose();
                    failures.push(format!("{kind}: {err}"));
                }
            }
        }

        let message = if failures.is_empty() {
            "no backend candidates were available".to_string()
        } else {
            failures.join("; ")
        };
        let err = CarouselError::InitializationFailure(message.clone());
        tracing::error!(%message, "no rendering backend could be initialised");
        self.bus.publish(CarouselEvent::Error(Arc::new(
            CarouselError::InitializationFailure(message),
        )));
        Err(err)
    }

    fn preload(&mut self) {
        let urls = self.options.images.clone();
        let loader = Arc::clone(&self.loader);
        let current = self.playback.current_index();
        let steady = self.steady_parameters();

        let Self {
            backend,
            backend_span,
            textures,
            bus,
            ..
        } = self;
        let mut painted = false;
        let images = loader.preload_with_progress(&urls, &mut |progress: LoadProgress<'_>| {
            if let Some(error) = progress.error {
                tracing::warn!(url = %progress.image.url, %error, "image failed to load; using placeholder");
                bus.publish(CarouselEvent::Error(Arc::new(
                    CarouselError::ImageDecodeFailure {
                        url: progress.image.url.clone(),
                        message: error.to_string(),
                    },
                )));
            }
            if let Some(backend) = backend.as_deref_mut() {
                let _guard = backend_span.enter();
                if let Some(handle) = backend.load_texture(progress.image) {
                    textures.insert(progress.index, handle);
                }
                if progress.index == current && !painted {
                    painted = true;
                    let frame = FrameRequest::steady(textures.get(&current).copied(), &steady);
                    if let Err(err) = backend.render(&frame) {
                        tracing::error!(%err, "first paint failed");
                        bus.publish(CarouselEvent::Error(Arc::new(err)));
                    }
                }
            }
            tracing::debug!(
                index = progress.index,
                loaded = progress.loaded,
                total = progress.total,
                "image loaded"
            );
            bus.publish(CarouselEvent::ImageLoaded {
                index: progress.index,
                image: Arc::clone(progress.image),
            });
        });

        self.images = images;
        self.bus
            .publish(CarouselEvent::AllImagesLoaded(self.images.clone()));
    }

    /// Per-frame callback: context signals, autoplay, then one transition step.
    pub fn tick(&mut self) {
        if !self.ready {
            return;
        }
        let span = self.span.clone();
        let _guard = span.enter();

        self.pump_signals();
        if self.context_lost {
            return;
        }
        let now = self.clock.now();
        for event in self.playback.tick(now) {
            self.handle_playback(event, now);
        }
        self.advance(now);
    }

    fn pump_signals(&mut self) {
        while let Some(signal) = self.backend.as_deref_mut().and_then(|backend| backend.poll_signal()) {
            match signal {
                ContextSignal::Lost => self.on_context_lost(),
                ContextSignal::Restored => self.on_context_restored(),
            }
        }
    }

    fn on_context_lost(&mut self) {
        let now = self.clock.now();
        if self.active.take().is_some() {
            self.playback.abort_transition(now);
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.release_textures();
        }
        self.textures.clear();
        self.context_lost = true;
        tracing::warn!(index = self.playback.current_index(), "rendering context lost");
        self.bus.publish(CarouselEvent::ContextLost);
    }

    fn on_context_restored(&mut self) {
        self.context_lost = false;
        if let Some(backend) = self.backend.as_deref_mut() {
            for (index, image) in self.images.iter().enumerate() {
                if let Some(handle) = backend.load_texture(image) {
                    self.textures.insert(index, handle);
                }
            }
        }
        let effect = self.installed.take().unwrap_or_else(|| self.baseline());
        self.install_effect(effect);
        self.redraw_steady();
        tracing::info!(
            index = self.playback.current_index(),
            textures = self.textures.len(),
            "rendering context restored"
        );
        self.bus.publish(CarouselEvent::ContextRestored);
    }

    fn handle_playback(&mut self, event: PlaybackEvent, now: Instant) {
        match event {
            PlaybackEvent::TransitionStart {
                from,
                to,
                effect,
                duration,
            } => {
                tracing::debug!(from, to, %effect, ?duration, "transition start");
                self.bus
                    .publish(CarouselEvent::TransitionStart { from, to });
                self.begin_transition(from, to, &effect, duration, now);
            }
            PlaybackEvent::TransitionEnd(index) => {
                tracing::debug!(index, "transition end");
                self.bus.publish(CarouselEvent::TransitionEnd(index));
            }
            PlaybackEvent::Play => self.bus.publish(CarouselEvent::Play),
            PlaybackEvent::Pause => self.bus.publish(CarouselEvent::Pause),
        }
    }

    fn begin_transition(&mut self, from: usize, to: usize, effect: &str, duration: Duration, now: Instant) {
        let ready = self.images.get(from).is_some()
            && self.images.get(to).is_some()
            && self.backend.is_some()
            && !self.context_lost;
        if !ready {
            tracing::debug!(from, to, "images not available; completing immediately");
            self.finish_transition(to, now);
            return;
        }

        let effect = self.resolve_effect(effect);
        self.install_effect(effect);
        self.texture_for(from);
        self.texture_for(to);

        let effect = self.installed.clone().unwrap_or_else(|| self.baseline());
        self.active = Some(ActiveTransition {
            from,
            to,
            effect,
            clock: TransitionClock::new(duration, self.options.easing, now),
        });
    }

    fn finish_transition(&mut self, to: usize, now: Instant) {
        self.active = None;
        if let Some(event) = self.playback.transition_completed(to, now) {
            self.handle_playback(event, now);
        }
    }

    fn advance(&mut self, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        let guard = self.backend_span.enter();

        let frame = active.clock.sample(now);
        let mut parameters = active.effect.parameters(frame.progress);
        active.effect.pre_draw(frame.progress, &mut parameters);
        let request = FrameRequest {
            current: self.textures.get(&active.from).copied(),
            next: self.textures.get(&active.to).copied(),
            progress: frame.progress,
            parameters: &parameters,
        };
        let result = backend.render(&request);
        active.effect.post_draw(frame.progress);
        tracing::trace!(progress = frame.progress, "frame");

        let (from, to) = (active.from, active.to);
        drop(guard);
        match result {
            Ok(()) if frame.finished => self.finish_transition(to, now),
            Ok(()) => {}
            Err(err) => {
                tracing::error!(from, to, %err, "draw failed; completing transition");
                self.bus
                    .publish(CarouselEvent::Error(Arc::new(CarouselError::DrawTimeFailure {
                        from,
                        to,
                        message: err.to_string(),
                    })));
                self.finish_transition(to, now);
            }
        }
    }

    fn texture_for(&mut self, index: usize) -> Option<TextureHandle> {
        if let Some(handle) = self.textures.get(&index) {
            return Some(*handle);
        }
        let image = self.images.get(index)?;
        let handle = self.backend.as_deref_mut()?.load_texture(image)?;
        self.textures.insert(index, handle);
        Some(handle)
    }

    fn baseline(&self) -> Arc<EffectDefinition> {
        self.registry
            .get(BASELINE_EFFECT)
            .unwrap_or_else(|| Arc::new(catalog::crossfade()))
    }

    fn supports(&self, effect: &EffectDefinition) -> bool {
        let Some(backend) = self.backend.as_deref() else {
            return true;
        };
        let caps = backend.capabilities();
        let needs = effect.requirements();
        (!needs.advanced_backend || caps.advanced) && (!needs.custom_mesh || caps.custom_mesh)
    }

    fn report_unsupported(&mut self, effect: &str) {
        let Some(kind) = self.backend_kind() else {
            return;
        };
        tracing::warn!(effect, backend = %kind, fallback = BASELINE_EFFECT, "effect unsupported by backend");
        self.bus.publish(CarouselEvent::Error(Arc::new(
            CarouselError::UnsupportedEffectCapability {
                effect: effect.to_string(),
                backend: kind,
                fallback: BASELINE_EFFECT.to_string(),
            },
        )));
    }

    fn resolve_effect(&mut self, name: &str) -> Arc<EffectDefinition> {
        if !self.registry.has(name) {
            tracing::warn!(effect = name, "effect not registered; using default");
        }
        let effect = self.registry.resolve(name);
        if self.supports(&effect) {
            return effect;
        }
        self.report_unsupported(effect.name());
        self.baseline()
    }

    /// Swaps the backend program. A failure keeps the previous program.
    fn install_effect(&mut self, effect: Arc<EffectDefinition>) -> bool {
        if self
            .installed
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, &effect))
        {
            return true;
        }
        let Some(backend) = self.backend.as_deref_mut() else {
            return false;
        };
        let _guard = self.backend_span.enter();
        match backend.set_effect(&ShaderProgram::from_effect(&effect)) {
            Ok(()) => {
                tracing::debug!(effect = effect.name(), "effect installed");
                self.installed = Some(effect);
                true
            }
            Err(err @ CarouselError::UnsupportedEffectCapability { .. }) => {
                tracing::warn!(%err, "falling back to baseline effect");
                self.bus.publish(CarouselEvent::Error(Arc::new(err)));
                let baseline = self
                    .registry
                    .get(BASELINE_EFFECT)
                    .unwrap_or_else(|| Arc::new(catalog::crossfade()));
                match backend.set_effect(&ShaderProgram::from_effect(&baseline)) {
                    Ok(()) => {
                        self.installed = Some(baseline);
                        true
                    }
                    Err(err) => {
                        tracing::error!(%err, "baseline effect failed to install; keeping previous program");
                        self.bus.publish(CarouselEvent::Error(Arc::new(err)));
                        false
                    }
                }
            }
            Err(err) => {
                tracing::error!(effect = effect.name(), %err, "failed to install effect; keeping previous program");
                self.bus.publish(CarouselEvent::Error(Arc::new(err)));
                false
            }
        }
    }

    fn steady_parameters(&self) -> EffectParameters {
        self.installed
            .as_ref()
            .map(|effect| effect.parameters(0.0))
            .unwrap_or_default()
    }

    fn redraw_steady(&mut self) {
        if self.context_lost {
            return;
        }
        let parameters = self.steady_parameters();
        let current = self.textures.get(&self.playback.current_index()).copied();
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        let _guard = self.backend_span.enter();
        if let Err(err) = backend.render(&FrameRequest::steady(current, &parameters)) {
            tracing::error!(%err, "steady-state redraw failed");
            self.bus.publish(CarouselEvent::Error(Arc::new(err)));
        }
    }

    fn navigate(&mut self, request: std::result::Result<PlaybackEvent, Rejected>) -> bool {
        match request {
            Ok(event) => {
                let now = self.clock.now();
                self.handle_playback(event, now);
                true
            }
            Err(reason) => {
                tracing::debug!(%reason, "navigation rejected");
                false
            }
        }
    }

    /// Starts a transition to the next image. Returns whether it was accepted.
    pub fn next(&mut self) -> bool {
        let _guard = self.span.clone().entered();
        let request = self.playback.request_next();
        self.navigate(request)
    }

    pub fn previous(&mut self) -> bool {
        let _guard = self.span.clone().entered();
        let request = self.playback.request_previous();
        self.navigate(request)
    }

    pub fn go_to(&mut self, index: usize) -> bool {
        let _guard = self.span.clone().entered();
        let request = self.playback.request_go_to(index);
        self.navigate(request)
    }

    pub fn play(&mut self) {
        self.set_playing(true);
    }

    pub fn pause(&mut self) {
        self.set_playing(false);
    }

    fn set_playing(&mut self, playing: bool) {
        let now = self.clock.now();
        if let Some(event) = self.playback.set_playing(playing, now) {
            self.handle_playback(event, now);
        }
    }

    /// Starts or stops autoplay. `interval`, when given, replaces the current
    /// one and applies from the next time the timer is armed; `None` keeps it.
    pub fn set_autoplay(&mut self, enabled: bool, interval: Option<Duration>) {
        match interval {
            Some(interval) if interval.is_zero() => {
                tracing::warn!("ignoring zero autoplay interval");
            }
            Some(interval) => self.playback.set_autoplay_interval(interval),
            None => {}
        }
        self.set_playing(enabled);
    }

    /// Applies to the next transition; one in flight keeps its duration.
    pub fn set_transition_duration(&mut self, duration: Duration) {
        self.playback.set_duration(duration);
    }

    /// Selects the effect for later transitions.
    ///
    /// Unknown names are rejected. An effect the active backend cannot run is
    /// replaced by the baseline crossfade and still reported as accepted.
    pub fn set_effect(&mut self, name: &str) -> bool {
        let _guard = self.span.clone().entered();
        let Some(effect) = self.registry.get(name) else {
            tracing::warn!(effect = name, "unknown effect");
            self.bus.publish(CarouselEvent::Error(Arc::new(CarouselError::Effect(
                EffectError::NotFound(name.to_string()),
            ))));
            return false;
        };
        if self.supports(&effect) {
            self.playback.set_effect(name);
        } else {
            self.report_unsupported(name);
            self.playback.set_effect(BASELINE_EFFECT);
        }
        true
    }

    pub fn register_effect(&mut self, effect: EffectDefinition) -> Result<()> {
        self.registry.register(effect)?;
        Ok(())
    }

    /// Replaces the image list. Only allowed while no transition is in
    /// flight; the committed index is clamped into the new list.
    pub fn update_images(&mut self, images: Vec<String>) -> std::result::Result<(), Rejected> {
        let _guard = self.span.clone().entered();
        self.playback.replace_images(images.len())?;
        self.options.images = images;
        if !self.ready {
            return Ok(());
        }
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.release_textures();
        }
        self.textures.clear();
        self.preload();
        self.redraw_steady();
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.set_size(width, height);
        let (width, height) = self.surface.size();
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.resize(width, height);
        }
        if self.ready && self.active.is_none() {
            self.redraw_steady();
        }
    }

    /// Tears everything down. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let _guard = self.span.clone().entered();
        self.active = None;
        let now = self.clock.now();
        self.playback.abort_transition(now);
        self.playback.set_playing(false, now);
        if let Some(mut backend) = self.backend.take() {
            backend.dispose();
        }
        self.textures.clear();
        self.images.clear();
        self.installed = None;
        self.bus.clear();
        self.ready = false;
        self.disposed = true;
        tracing::debug!("carousel disposed");
    }

    pub fn current_index(&self) -> usize {
        self.playback.current_index()
    }

    pub fn is_transitioning(&self) -> bool {
        self.playback.is_transitioning()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_using_accelerated_backend(&self) -> bool {
        self.backend_kind().is_some_and(BackendKind::is_accelerated)
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_deref().map(|backend| backend.kind())
    }

    pub fn backend(&self) -> Option<&dyn RenderBackend> {
        self.backend.as_deref()
    }

    pub fn effect_name(&self) -> &str {
        self.playback.effect_name()
    }

    pub fn images(&self) -> &[Arc<LoadedImage>] {
        &self.images
    }

    pub fn surface(&self) -> &DrawSurface {
        &self.surface
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// True while a transition wants a frame every refresh.
    pub fn needs_frame(&self) -> bool {
        self.ready && self.active.is_some() && !self.context_lost
    }

    /// When the host should tick next if no frame is needed.
    pub fn next_deadline(&self) -> Option<Instant> {
        let autoplay = self.playback.next_deadline();
        if !self.context_lost {
            return autoplay;
        }
        let poll = self.clock.now() + RESTORE_POLL;
        Some(autoplay.map_or(poll, |deadline| deadline.min(poll)))
    }
}

impl Drop for Carousel {
    fn drop(&mut self) {
        self.dispose();
    }
}
