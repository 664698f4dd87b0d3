use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use image::{Rgba, RgbaImage};
use renderer::{
    BackendCapabilities, BackendKind, BackendPreference, BackendStats, Carousel, CarouselError,
    CarouselEvent, CarouselOptions, Clock, ContextSignal, DrawSurface, FrameRequest, ImageLoader,
    LoadedImage, ManualClock, MemoryLoader, Rejected, RenderBackend, ShaderProgram, TextureHandle,
};

#[derive(Clone, Copy, Debug, PartialEq)]
struct DrawnFrame {
    current: Option<TextureHandle>,
    next: Option<TextureHandle>,
    progress: f32,
}

#[derive(Default)]
struct Log {
    frames: Vec<DrawnFrame>,
    programs: Vec<String>,
    uploads: Vec<String>,
    signals: VecDeque<ContextSignal>,
    initialized: Vec<BackendKind>,
    disposed: Vec<BackendKind>,
    resizes: Vec<(u32, u32)>,
    fail_render: bool,
    fail_effects: Vec<&'static str>,
    unsupported_effects: Vec<&'static str>,
}

type SharedLog = Rc<RefCell<Log>>;

struct RecordingBackend {
    kind: BackendKind,
    capabilities: BackendCapabilities,
    fail_init: bool,
    log: SharedLog,
    live: bool,
    generation: u32,
    next_id: u64,
    by_url: HashMap<String, TextureHandle>,
}

impl RecordingBackend {
    fn new(kind: BackendKind, log: SharedLog) -> Self {
        let capabilities = if kind == BackendKind::ModernGpu {
            BackendCapabilities {
                shaders: true,
                custom_mesh: true,
                advanced: true,
            }
        } else {
            BackendCapabilities::default()
        };
        Self {
            kind,
            capabilities,
            fail_init: false,
            log,
            live: false,
            generation: 0,
            next_id: 1,
            by_url: HashMap::new(),
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn initialize(&mut self, _surface: &DrawSurface) -> renderer::Result<()> {
        if self.fail_init {
            return Err(CarouselError::BackendUnavailable {
                backend: self.kind,
                message: "no adapter".into(),
            });
        }
        self.live = true;
        self.log.borrow_mut().initialized.push(self.kind);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.live
    }

    fn set_effect(&mut self, program: &ShaderProgram) -> renderer::Result<()> {
        let mut log = self.log.borrow_mut();
        log.programs.push(program.name.clone());
        if log.unsupported_effects.contains(&program.name.as_str()) {
            return Err(CarouselError::UnsupportedEffectCapability {
                effect: program.name.clone(),
                backend: self.kind,
                fallback: "fade".into(),
            });
        }
        if log.fail_effects.contains(&program.name.as_str()) {
            return Err(CarouselError::ShaderCompileFailure {
                effect: program.name.clone(),
                message: "syntax error".into(),
            });
        }
        Ok(())
    }

    fn load_texture(&mut self, image: &LoadedImage) -> Option<TextureHandle> {
        if let Some(handle) = self.by_url.get(&image.url) {
            return Some(*handle);
        }
        let handle = TextureHandle::new(self.next_id, self.generation);
        self.next_id += 1;
        self.by_url.insert(image.url.clone(), handle);
        self.log.borrow_mut().uploads.push(image.url.clone());
        Some(handle)
    }

    fn render(&mut self, frame: &FrameRequest<'_>) -> renderer::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_render {
            return Err(CarouselError::Surface("frame acquire timed out".into()));
        }
        log.frames.push(DrawnFrame {
            current: frame.current,
            next: frame.next,
            progress: frame.progress,
        });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn release_textures(&mut self) {
        self.by_url.clear();
        self.generation += 1;
    }

    fn poll_signal(&mut self) -> Option<ContextSignal> {
        self.log.borrow_mut().signals.pop_front()
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            textures: self.by_url.len(),
            ..BackendStats::default()
        }
    }

    fn dispose(&mut self) {
        if self.live {
            self.live = false;
            self.log.borrow_mut().disposed.push(self.kind);
        }
    }
}

fn solid(rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(4, 3, Rgba(rgba))
}

fn loader() -> Arc<dyn ImageLoader> {
    Arc::new(
        MemoryLoader::new()
            .with_image("a.jpg", solid([255, 0, 0, 255]))
            .with_image("b.jpg", solid([0, 255, 0, 255]))
            .with_image("c.jpg", solid([0, 0, 255, 255])),
    )
}

fn options(images: &[&str]) -> CarouselOptions {
    CarouselOptions {
        images: images.iter().map(|url| url.to_string()).collect(),
        transition_duration: Duration::from_secs(1),
        ..CarouselOptions::default()
    }
}

struct Harness {
    carousel: Carousel,
    events: Receiver<CarouselEvent>,
    clock: ManualClock,
    log: SharedLog,
}

impl Harness {
    fn build(options: CarouselOptions, failing: &[BackendKind]) -> Self {
        let log = SharedLog::default();
        let clock = ManualClock::new();
        let factory_log = Rc::clone(&log);
        let failing = failing.to_vec();
        let mut carousel = Carousel::builder(options, DrawSurface::offscreen(32, 24))
            .backends(Box::new(move |kind| {
                let mut backend = RecordingBackend::new(kind, Rc::clone(&factory_log));
                backend.fail_init = failing.contains(&kind);
                Some(Box::new(backend) as Box<dyn RenderBackend>)
            }))
            .loader(loader())
            .clock(Box::new(clock.clone()))
            .build();
        let events = carousel.subscribe();
        Self {
            carousel,
            events,
            clock,
            log,
        }
    }

    fn ready(options: CarouselOptions) -> Self {
        let mut harness = Self::build(options, &[]);
        harness.carousel.initialize().unwrap();
        harness.drain();
        harness
    }

    fn drain(&self) -> Vec<CarouselEvent> {
        self.events.try_iter().collect()
    }

    fn step(&mut self, millis: u64) {
        self.clock.advance(Duration::from_millis(millis));
        self.carousel.tick();
    }

    fn transition_frames(&self) -> Vec<DrawnFrame> {
        self.log
            .borrow()
            .frames
            .iter()
            .filter(|frame| frame.next.is_some())
            .copied()
            .collect()
    }
}

fn transition_starts(events: &[CarouselEvent]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            CarouselEvent::TransitionStart { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

fn transition_ends(events: &[CarouselEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            CarouselEvent::TransitionEnd(index) => Some(*index),
            _ => None,
        })
        .collect()
}

fn errors(events: &[CarouselEvent]) -> Vec<Arc<CarouselError>> {
    events
        .iter()
        .filter_map(|event| match event {
            CarouselEvent::Error(err) => Some(Arc::clone(err)),
            _ => None,
        })
        .collect()
}

#[test]
fn initialize_loads_images_and_paints_the_start_image() {
    let mut harness = Harness::build(options(&["a.jpg", "b.jpg", "c.jpg"]), &[]);
    harness.carousel.initialize().unwrap();
    let events = harness.drain();

    assert!(harness.carousel.is_ready());
    assert_eq!(harness.carousel.backend_kind(), Some(BackendKind::ModernGpu));
    assert!(harness.carousel.is_using_accelerated_backend());
    assert!(matches!(
        events.last(),
        Some(CarouselEvent::Ready {
            backend: BackendKind::ModernGpu
        })
    ));
    let loaded = events
        .iter()
        .filter(|event| matches!(event, CarouselEvent::ImageLoaded { .. }))
        .count();
    assert_eq!(loaded, 3);

    let log = harness.log.borrow();
    assert_eq!(log.programs, vec!["fade"]);
    assert_eq!(log.uploads.len(), 3);
    assert_eq!(log.frames.len(), 1);
    assert!(log.frames[0].current.is_some());
    assert!(log.frames[0].next.is_none());
}

#[test]
fn previous_at_first_image_without_loop_is_ignored() {
    let mut harness = Harness::ready(CarouselOptions {
        loop_enabled: false,
        ..options(&["a.jpg", "b.jpg", "c.jpg"])
    });

    assert!(!harness.carousel.previous());
    assert_eq!(harness.carousel.current_index(), 0);
    assert!(transition_starts(&harness.drain()).is_empty());
}

#[test]
fn next_from_last_image_wraps_when_looping() {
    let mut harness = Harness::ready(CarouselOptions {
        start_index: 2,
        ..options(&["a.jpg", "b.jpg", "c.jpg"])
    });

    assert!(harness.carousel.next());
    assert_eq!(transition_starts(&harness.drain()), vec![(2, 0)]);
    assert!(harness.carousel.is_transitioning());

    harness.step(500);
    assert_eq!(harness.carousel.current_index(), 2);
    harness.step(600);

    let events = harness.drain();
    assert_eq!(transition_ends(&events), vec![0]);
    assert_eq!(harness.carousel.current_index(), 0);
    assert!(!harness.carousel.is_transitioning());
}

#[test]
fn progress_is_monotonic_and_reaches_one_exactly_once() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    assert!(harness.carousel.next());
    for _ in 0..8 {
        harness.step(200);
    }

    let frames = harness.transition_frames();
    assert!(frames.len() >= 5);
    for pair in frames.windows(2) {
        assert!(pair[0].progress <= pair[1].progress);
    }
    let finished = frames.iter().filter(|frame| frame.progress == 1.0).count();
    assert_eq!(finished, 1);
    assert!(frames.iter().all(|frame| (0.0..=1.0).contains(&frame.progress)));
    assert_eq!(transition_ends(&harness.drain()), vec![1]);
}

#[test]
fn navigation_during_a_transition_is_rejected() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(harness.carousel.next());
    assert!(!harness.carousel.next());
    assert!(!harness.carousel.go_to(2));
    assert_eq!(transition_starts(&harness.drain()), vec![(0, 1)]);
}

#[test]
fn unsupported_effect_falls_back_to_the_baseline() {
    let mut harness = Harness::build(
        CarouselOptions {
            backend: BackendPreference::Raster,
            ..options(&["a.jpg", "b.jpg"])
        },
        &[],
    );
    harness.carousel.initialize().unwrap();
    harness.drain();
    assert_eq!(harness.carousel.backend_kind(), Some(BackendKind::Raster));

    assert!(harness.carousel.set_effect("tile-flip"));
    assert_eq!(harness.carousel.effect_name(), "fade");
    let reported = errors(&harness.drain());
    assert!(matches!(
        reported.as_slice(),
        [err] if matches!(**err, CarouselError::UnsupportedEffectCapability { .. })
    ));

    assert!(!harness.carousel.set_effect("sparkle"));
    assert_eq!(harness.carousel.effect_name(), "fade");
}

#[test]
fn supported_effect_is_installed_at_transition_start() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    assert!(harness.carousel.set_effect("wipe"));
    assert!(harness.carousel.next());
    harness.step(1100);

    assert_eq!(harness.log.borrow().programs, vec!["fade", "wipe"]);
    assert!(errors(&harness.drain()).is_empty());
}

#[test]
fn draw_failure_completes_the_transition() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg", "c.jpg"]));
    assert!(harness.carousel.next());
    harness.step(200);
    harness.drain();

    harness.log.borrow_mut().fail_render = true;
    harness.step(100);

    let events = harness.drain();
    assert_eq!(transition_ends(&events), vec![1]);
    assert!(errors(&events).iter().any(|err| matches!(
        **err,
        CarouselError::DrawTimeFailure { from: 0, to: 1, .. }
    )));
    assert!(!harness.carousel.is_transitioning());
    assert_eq!(harness.carousel.current_index(), 1);

    harness.log.borrow_mut().fail_render = false;
    assert!(harness.carousel.next());
    assert_eq!(transition_starts(&harness.drain()), vec![(1, 2)]);
}

#[test]
fn shader_compile_failure_keeps_the_installed_program() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg", "c.jpg"]));
    harness.log.borrow_mut().fail_effects.push("wipe");

    assert!(harness.carousel.set_effect("wipe"));
    assert!(harness.carousel.next());
    let reported = errors(&harness.drain());
    assert!(matches!(
        reported.as_slice(),
        [err] if matches!(&**err, CarouselError::ShaderCompileFailure { effect, .. } if effect == "wipe")
    ));

    harness.step(500);
    harness.step(600);
    assert_eq!(transition_ends(&harness.drain()), vec![1]);
    assert!(!harness.transition_frames().is_empty());

    // The crossfade is still bound, so switching back needs no reinstall.
    assert!(harness.carousel.set_effect("fade"));
    assert!(harness.carousel.next());
    assert_eq!(harness.log.borrow().programs, vec!["fade", "wipe"]);
}

#[test]
fn baseline_install_failure_is_reported_and_previous_program_kept() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    {
        let mut log = harness.log.borrow_mut();
        log.unsupported_effects.push("tile-flip");
        log.fail_effects.push("fade");
    }

    assert!(harness.carousel.set_effect("tile-flip"));
    assert!(harness.carousel.next());

    let reported = errors(&harness.drain());
    assert!(matches!(
        reported.as_slice(),
        [unsupported, compile]
            if matches!(**unsupported, CarouselError::UnsupportedEffectCapability { .. })
                && matches!(&**compile, CarouselError::ShaderCompileFailure { effect, .. } if effect == "fade")
    ));
    assert_eq!(harness.log.borrow().programs, vec!["fade", "tile-flip", "fade"]);
    assert!(harness.carousel.is_transitioning());

    harness.step(1100);
    assert_eq!(transition_ends(&harness.drain()), vec![1]);
}

#[test]
fn resize_redraws_only_when_idle() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    let drawn = harness.log.borrow().frames.len();

    harness.carousel.resize(64, 48);
    {
        let log = harness.log.borrow();
        assert_eq!(log.resizes, vec![(64, 48)]);
        assert_eq!(log.frames.len(), drawn + 1);
        let last = log.frames.last().copied().unwrap();
        assert!(last.current.is_some());
        assert!(last.next.is_none());
    }

    assert!(harness.carousel.next());
    harness.step(300);
    let drawn = harness.log.borrow().frames.len();
    harness.carousel.resize(80, 60);

    let log = harness.log.borrow();
    assert_eq!(log.resizes, vec![(64, 48), (80, 60)]);
    assert_eq!(log.frames.len(), drawn);
}

#[test]
fn set_autoplay_keeps_the_interval_when_none_is_given() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    assert_eq!(harness.carousel.next_deadline(), None);

    let interval = Duration::from_secs(3);
    harness.carousel.set_autoplay(true, Some(interval));
    assert!(harness.carousel.is_playing());
    assert_eq!(
        harness.carousel.next_deadline(),
        Some(harness.clock.now() + interval)
    );

    harness.carousel.set_autoplay(false, None);
    assert_eq!(harness.carousel.next_deadline(), None);

    harness.step(500);
    harness.carousel.set_autoplay(true, None);
    assert_eq!(
        harness.carousel.next_deadline(),
        Some(harness.clock.now() + interval)
    );

    harness.carousel.set_autoplay(false, Some(Duration::ZERO));
    harness.carousel.set_autoplay(true, None);
    assert_eq!(
        harness.carousel.next_deadline(),
        Some(harness.clock.now() + interval)
    );
}

#[test]
fn context_loss_mid_transition_recovers_on_restore() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg", "c.jpg"]));
    assert!(harness.carousel.next());
    harness.step(300);
    let drawn_before = harness.log.borrow().frames.len();

    harness.log.borrow_mut().signals.push_back(ContextSignal::Lost);
    harness.step(100);
    assert!(!harness.carousel.is_transitioning());
    assert_eq!(harness.carousel.current_index(), 0);
    assert!(!harness.carousel.needs_frame());
    assert!(harness.carousel.next_deadline().is_some());

    harness.step(500);
    harness.step(500);
    assert_eq!(harness.log.borrow().frames.len(), drawn_before);

    harness.log.borrow_mut().signals.push_back(ContextSignal::Restored);
    harness.step(100);

    let events = harness.drain();
    assert!(events
        .iter()
        .any(|event| matches!(event, CarouselEvent::ContextLost)));
    assert!(matches!(events.last(), Some(CarouselEvent::ContextRestored)));
    assert!(transition_ends(&events).is_empty());
    assert_eq!(harness.carousel.current_index(), 0);

    let log = harness.log.borrow();
    assert_eq!(log.uploads.len(), 6);
    let last = log.frames.last().copied().unwrap();
    assert!(last.next.is_none());
    assert_eq!(last.current.map(|handle| handle.generation()), Some(1));
}

#[test]
fn failed_decode_keeps_its_slot_with_a_placeholder() {
    let mut harness = Harness::build(options(&["a.jpg", "missing.jpg", "c.jpg"]), &[]);
    harness.carousel.initialize().unwrap();
    let events = harness.drain();

    let all = events.iter().find_map(|event| match event {
        CarouselEvent::AllImagesLoaded(images) => Some(images.clone()),
        _ => None,
    });
    let all = all.expect("all images loaded event");
    assert_eq!(all.len(), 3);
    assert!(all[1].placeholder);
    assert_eq!((all[1].width, all[1].height), (1, 1));
    assert!(!all[0].placeholder);

    let reported = errors(&events);
    assert!(matches!(
        reported.as_slice(),
        [err] if matches!(&**err, CarouselError::ImageDecodeFailure { url, .. } if url == "missing.jpg")
    ));
}

#[test]
fn probing_skips_backends_that_fail_to_start() {
    let mut harness = Harness::build(options(&["a.jpg"]), &[BackendKind::ModernGpu]);
    harness.carousel.initialize().unwrap();

    assert_eq!(harness.carousel.backend_kind(), Some(BackendKind::LegacyGpu));
    assert_eq!(harness.log.borrow().initialized, vec![BackendKind::LegacyGpu]);
}

#[test]
fn initialization_fails_when_no_backend_starts() {
    let mut harness = Harness::build(
        CarouselOptions {
            allow_raster_fallback: false,
            ..options(&["a.jpg"])
        },
        &[BackendKind::ModernGpu, BackendKind::LegacyGpu],
    );

    let err = harness.carousel.initialize().unwrap_err();
    assert!(err.is_fatal());
    assert!(!harness.carousel.is_ready());
    let reported = errors(&harness.drain());
    assert!(matches!(
        reported.as_slice(),
        [err] if matches!(**err, CarouselError::InitializationFailure(_))
    ));
}

#[test]
fn autoplay_advances_and_pauses_at_the_end_without_loop() {
    let mut harness = Harness::ready(CarouselOptions {
        autoplay: true,
        autoplay_interval: Duration::from_secs(2),
        loop_enabled: false,
        ..options(&["a.jpg", "b.jpg"])
    });
    assert!(harness.carousel.is_playing());

    harness.step(1000);
    assert!(!harness.carousel.is_transitioning());
    harness.step(1000);
    assert!(harness.carousel.is_transitioning());
    harness.step(1000);
    assert_eq!(harness.carousel.current_index(), 1);

    harness.step(2000);
    harness.step(100);
    let events = harness.drain();
    assert_eq!(transition_starts(&events), vec![(0, 1)]);
    assert!(events.iter().any(|event| matches!(event, CarouselEvent::Pause)));
    assert!(!harness.carousel.is_playing());
}

#[test]
fn update_images_is_rejected_mid_transition() {
    let mut harness = Harness::ready(CarouselOptions {
        start_index: 2,
        ..options(&["a.jpg", "b.jpg", "c.jpg"])
    });
    assert!(harness.carousel.next());
    assert_eq!(
        harness.carousel.update_images(vec!["a.jpg".into()]),
        Err(Rejected::Transitioning)
    );

    harness.step(1100);
    harness
        .carousel
        .update_images(vec!["b.jpg".into(), "c.jpg".into()])
        .unwrap();
    assert_eq!(harness.carousel.images().len(), 2);
    assert_eq!(harness.carousel.current_index(), 0);
    let last = harness.log.borrow().frames.last().copied().unwrap();
    assert!(last.current.is_some());
    assert!(last.next.is_none());
}

#[test]
fn dispose_is_idempotent() {
    let mut harness = Harness::ready(options(&["a.jpg", "b.jpg"]));
    harness.carousel.dispose();
    harness.carousel.dispose();

    assert!(!harness.carousel.is_ready());
    assert!(harness.carousel.backend().is_none());
    assert_eq!(harness.log.borrow().disposed, vec![BackendKind::ModernGpu]);
    assert!(harness.carousel.initialize().is_err());
    assert!(harness.carousel.images().is_empty());
}
