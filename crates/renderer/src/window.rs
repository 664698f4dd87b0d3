use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use effects::EffectRegistry;
use tracing::{error, info};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::carousel::Carousel;
use crate::events::CarouselEvent;
use crate::surface::{DrawSurface, PresentTarget};
use crate::types::CarouselOptions;

/// Window settings for the interactive host.
#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub size: (u32, u32),
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "shaderslide".to_string(),
            size: (1280, 720),
        }
    }
}

/// What a key press asks the carousel to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAction {
    Next,
    Previous,
    ToggleAutoplay,
    GoTo(usize),
    Exit,
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.state != ElementState::Pressed {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::ArrowRight) => Some(KeyAction::Next),
        Key::Named(NamedKey::ArrowLeft) => Some(KeyAction::Previous),
        Key::Named(NamedKey::Escape) => Some(KeyAction::Exit),
        _ if event.repeat => None,
        Key::Named(NamedKey::Space) => Some(KeyAction::ToggleAutoplay),
        Key::Character(value) => action_for_character(value.as_str()),
        _ => None,
    }
}

fn action_for_character(value: &str) -> Option<KeyAction> {
    match value {
        " " => Some(KeyAction::ToggleAutoplay),
        "q" => Some(KeyAction::Exit),
        digit => digit
            .parse::<usize>()
            .ok()
            .filter(|number| (1..=9).contains(number))
            .map(|number| KeyAction::GoTo(number - 1)),
    }
}

/// Opens a window and runs a carousel in it until the window closes.
///
/// Blocks the calling thread, which must be the main thread on platforms
/// that require it.
pub fn run_window(
    options: CarouselOptions,
    config: WindowConfig,
    registry: EffectRegistry,
) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(config.size.0, config.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);
    let size = window.inner_size();

    let target: Arc<dyn PresentTarget> = window.clone();
    let surface = DrawSurface::with_target(target, size.width, size.height);
    let mut carousel = Carousel::builder(options, surface)
        .registry(registry)
        .build();
    let events = carousel.subscribe();
    carousel
        .initialize()
        .map_err(|err| anyhow!("failed to start carousel: {err}"))?;
    info!(
        backend = ?carousel.backend_kind(),
        images = carousel.images().len(),
        "window carousel running"
    );
    window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. } => {
                    let Some(action) = key_action(&event) else {
                        return;
                    };
                    match action {
                        KeyAction::Next => {
                            carousel.next();
                        }
                        KeyAction::Previous => {
                            carousel.previous();
                        }
                        KeyAction::GoTo(index) => {
                            carousel.go_to(index);
                        }
                        KeyAction::ToggleAutoplay if carousel.is_playing() => carousel.pause(),
                        KeyAction::ToggleAutoplay => carousel.play(),
                        KeyAction::Exit => elwt.exit(),
                    }
                    window.request_redraw();
                }
                WindowEvent::Resized(new_size) => {
                    carousel.resize(new_size.width, new_size.height);
                    window.request_redraw();
                }
                WindowEvent::RedrawRequested => carousel.tick(),
                _ => {}
            },
            Event::AboutToWait => {
                log_events(&events);
                let now = Instant::now();
                if carousel.needs_frame() {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                } else if let Some(deadline) = carousel.next_deadline() {
                    if deadline <= now {
                        window.request_redraw();
                        elwt.set_control_flow(ControlFlow::Wait);
                    } else {
                        tracing::trace!(
                            wait_ms = deadline.saturating_duration_since(now).as_millis(),
                            "waiting for next deadline"
                        );
                        elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                    }
                } else {
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
            Event::LoopExiting => carousel.dispose(),
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

fn log_events(events: &Receiver<CarouselEvent>) {
    for event in events.try_iter() {
        match event {
            CarouselEvent::Error(err) => error!(error = %err, "carousel error"),
            CarouselEvent::TransitionEnd(index) => info!(index, "showing image"),
            CarouselEvent::ContextLost => info!("rendering context lost; waiting for restore"),
            other => tracing::debug!(event = ?other, "carousel event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_jump_to_one_based_slots() {
        assert_eq!(action_for_character("1"), Some(KeyAction::GoTo(0)));
        assert_eq!(action_for_character("9"), Some(KeyAction::GoTo(8)));
        assert_eq!(action_for_character("0"), None);
        assert_eq!(action_for_character("x"), None);
    }

    #[test]
    fn space_and_q_map_to_controls() {
        assert_eq!(action_for_character(" "), Some(KeyAction::ToggleAutoplay));
        assert_eq!(action_for_character("q"), Some(KeyAction::Exit));
    }
}
