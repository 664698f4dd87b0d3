//! Transition and autoplay state machine for a carousel.
//!
//! `Playback` owns the committed index, the in-flight transition flag and the
//! autoplay deadline. Every input returns the lifecycle event it produced (if
//! any) so the caller decides how to broadcast it. Time is always passed in,
//! which keeps the machine deterministic under test.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("a transition is already in flight")]
    Transitioning,
    #[error("no images are loaded")]
    Empty,
    #[error("already at the {0} boundary and looping is disabled")]
    Boundary(Edge),
    #[error("index {index} is out of range for {count} images")]
    OutOfRange { index: usize, count: usize },
    #[error("index {0} is already current")]
    SameIndex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    First,
    Last,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::First => f.write_str("first"),
            Edge::Last => f.write_str("last"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    TransitionStart {
        from: usize,
        to: usize,
        effect: String,
        duration: Duration,
    },
    TransitionEnd(usize),
    Play,
    Pause,
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub image_count: usize,
    pub start_index: usize,
    pub effect: String,
    pub transition_duration: Duration,
    pub autoplay_interval: Duration,
    pub loop_enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            image_count: 0,
            start_index: 0,
            effect: "fade".to_string(),
            transition_duration: Duration::from_secs(1),
            autoplay_interval: Duration::from_secs(5),
            loop_enabled: true,
        }
    }
}

/// Snapshot of the observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionState {
    pub current_index: usize,
    pub target_index: Option<usize>,
    pub image_count: usize,
    pub is_playing: bool,
    pub effect_name: String,
    pub transition_duration: Duration,
    pub autoplay_interval: Duration,
    pub loop_enabled: bool,
}

impl TransitionState {
    pub fn is_transitioning(&self) -> bool {
        self.target_index.is_some()
    }
}

pub struct Playback {
    state: TransitionState,
    autoplay_deadline: Option<Instant>,
}

impl Playback {
    pub fn new(config: PlaybackConfig) -> Self {
        let start_index = if config.image_count == 0 {
            0
        } else {
            config.start_index.min(config.image_count - 1)
        };
        Self {
            state: TransitionState {
                current_index: start_index,
                target_index: None,
                image_count: config.image_count,
                is_playing: false,
                effect_name: config.effect,
                transition_duration: config.transition_duration,
                autoplay_interval: config.autoplay_interval,
                loop_enabled: config.loop_enabled,
            },
            autoplay_deadline: None,
        }
    }

    pub fn state(&self) -> &TransitionState {
        &self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.is_transitioning()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn effect_name(&self) -> &str {
        &self.state.effect_name
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.autoplay_deadline
    }

    pub fn request_next(&mut self) -> Result<PlaybackEvent, Rejected> {
        self.check_idle()?;
        let count = self.state.image_count;
        let current = self.state.current_index;
        let target = if current + 1 < count {
            current + 1
        } else if self.state.loop_enabled {
            0
        } else {
            return Err(Rejected::Boundary(Edge::Last));
        };
        self.start(target)
    }

    pub fn request_previous(&mut self) -> Result<PlaybackEvent, Rejected> {
        self.check_idle()?;
        let count = self.state.image_count;
        let current = self.state.current_index;
        let target = if current > 0 {
            current - 1
        } else if self.state.loop_enabled {
            count - 1
        } else {
            return Err(Rejected::Boundary(Edge::First));
        };
        self.start(target)
    }

    pub fn request_go_to(&mut self, index: usize) -> Result<PlaybackEvent, Rejected> {
        self.check_idle()?;
        let count = self.state.image_count;
        if index >= count {
            return Err(Rejected::OutOfRange { index, count });
        }
        if index == self.state.current_index {
            return Err(Rejected::SameIndex(index));
        }
        self.start(index)
    }

    /// Commits the in-flight move. Ignored when idle.
    pub fn transition_completed(&mut self, index: usize, now: Instant) -> Option<PlaybackEvent> {
        let target = self.state.target_index.take()?;
        if target != index {
            tracing::debug!(target, index, "transition completed at a different index");
        }
        self.state.current_index = index.min(self.state.image_count.saturating_sub(1));
        if self.state.is_playing {
            self.arm(now);
        }
        Some(PlaybackEvent::TransitionEnd(self.state.current_index))
    }

    /// Drops the in-flight move without committing it. No end event is produced.
    pub fn abort_transition(&mut self, now: Instant) -> bool {
        if self.state.target_index.take().is_none() {
            return false;
        }
        if self.state.is_playing {
            self.arm(now);
        }
        true
    }

    pub fn set_playing(&mut self, playing: bool, now: Instant) -> Option<PlaybackEvent> {
        if playing {
            if self.state.is_playing {
                return None;
            }
            self.state.is_playing = true;
            if !self.is_transitioning() {
                self.arm(now);
            }
            Some(PlaybackEvent::Play)
        } else {
            if !self.state.is_playing {
                return None;
            }
            self.state.is_playing = false;
            self.autoplay_deadline = None;
            Some(PlaybackEvent::Pause)
        }
    }

    pub fn set_effect(&mut self, name: impl Into<String>) {
        self.state.effect_name = name.into();
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.state.transition_duration = duration;
    }

    /// Takes effect from the next time the timer is armed.
    pub fn set_autoplay_interval(&mut self, interval: Duration) {
        self.state.autoplay_interval = interval;
    }

    /// Swaps the image list length. Only allowed while idle; the committed
    /// index is clamped into the new range.
    pub fn replace_images(&mut self, image_count: usize) -> Result<(), Rejected> {
        if self.is_transitioning() {
            return Err(Rejected::Transitioning);
        }
        self.state.image_count = image_count;
        self.state.current_index = self
            .state
            .current_index
            .min(image_count.saturating_sub(1));
        Ok(())
    }

    /// Fires the autoplay timer if its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Vec<PlaybackEvent> {
        let Some(deadline) = self.autoplay_deadline else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }
        self.autoplay_deadline = None;
        if self.is_transitioning() {
            // Completion re-arms; a missed tick is not queued.
            return Vec::new();
        }
        match self.request_next() {
            Ok(event) => vec![event],
            Err(Rejected::Boundary(_)) => {
                tracing::debug!("autoplay reached the last image; pausing");
                self.set_playing(false, now).into_iter().collect()
            }
            Err(reason) => {
                tracing::trace!(%reason, "autoplay tick skipped");
                self.arm(now);
                Vec::new()
            }
        }
    }

    fn check_idle(&self) -> Result<(), Rejected> {
        if self.is_transitioning() {
            return Err(Rejected::Transitioning);
        }
        if self.state.image_count == 0 {
            return Err(Rejected::Empty);
        }
        Ok(())
    }

    fn start(&mut self, target: usize) -> Result<PlaybackEvent, Rejected> {
        let from = self.state.current_index;
        if target == from {
            return Err(Rejected::SameIndex(target));
        }
        self.state.target_index = Some(target);
        self.autoplay_deadline = None;
        Ok(PlaybackEvent::TransitionStart {
            from,
            to: target,
            effect: self.state.effect_name.clone(),
            duration: self.state.transition_duration,
        })
    }

    /// An interval too large to represent leaves the timer unarmed, which
    /// is the same as never firing.
    fn arm(&mut self, now: Instant) {
        self.autoplay_deadline = now.checked_add(self.state.autoplay_interval);
        if self.autoplay_deadline.is_none() {
            tracing::debug!(
                interval = ?self.state.autoplay_interval,
                "autoplay interval out of range; timer left unarmed"
            );
        }
    }
}
