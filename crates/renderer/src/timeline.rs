use std::time::{Duration, Instant};

/// Shape applied to raw transition progress. Every curve is monotonic and
/// maps 0 to 0 and 1 to 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    #[default]
    Linear,
    Smoothstep,
    EaseInOut,
}

impl Easing {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => clamped,
            Easing::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Easing::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameProgress {
    pub progress: f32,
    pub finished: bool,
}

/// Wall-clock envelope for one in-flight transition.
#[derive(Clone, Debug)]
pub(crate) struct TransitionClock {
    start: Instant,
    duration: Duration,
    easing: Easing,
    last: f32,
}

impl TransitionClock {
    pub fn new(duration: Duration, easing: Easing, now: Instant) -> Self {
        Self {
            start: now,
            duration,
            easing,
            last: 0.0,
        }
    }

    /// `clamp(elapsed / duration, 0, 1)`; a zero duration is already complete.
    pub fn raw_progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Eased progress for the frame at `now`, never lower than the previous frame.
    pub fn sample(&mut self, now: Instant) -> FrameProgress {
        let raw = self.raw_progress(now);
        let finished = raw >= 1.0;
        let eased = if finished {
            1.0
        } else {
            self.easing.sample(raw).min(1.0)
        };
        self.last = self.last.max(eased);
        FrameProgress {
            progress: self.last,
            finished,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_curve_increases_monotonically() {
        let curve = Easing::Linear;
        let mut last = 0.0;
        for step in 0..=10 {
            let sample = curve.sample(step as f32 / 10.0);
            assert!(sample >= last - f32::EPSILON);
            last = sample;
        }
    }

    #[test]
    fn smoothstep_matches_expected_values() {
        let curve = Easing::Smoothstep;
        assert!((curve.sample(0.0) - 0.0).abs() < 1e-6);
        assert!((curve.sample(0.5) - 0.5).abs() < 1e-6);
        assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ease_in_out_accelerates_then_decelerates() {
        let curve = Easing::EaseInOut;
        let first = curve.sample(0.25);
        let mid = curve.sample(0.5);
        let last = curve.sample(0.75);
        assert!(first < mid);
        assert!(last > mid);
        assert!((curve.sample(0.0) - 0.0).abs() < 1e-6);
        assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clock_reports_half_way() {
        let start = Instant::now();
        let mut clock = TransitionClock::new(Duration::from_millis(100), Easing::Linear, start);
        let frame = clock.sample(start + Duration::from_millis(50));
        assert!((frame.progress - 0.5).abs() < 0.05);
        assert!(!frame.finished);
    }

    #[test]
    fn clock_finishes_exactly_at_one() {
        let start = Instant::now();
        let mut clock = TransitionClock::new(Duration::from_millis(100), Easing::EaseInOut, start);
        let frame = clock.sample(start + Duration::from_millis(250));
        assert_eq!(frame.progress, 1.0);
        assert!(frame.finished);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let start = Instant::now();
        let mut clock = TransitionClock::new(Duration::ZERO, Easing::Linear, start);
        assert_eq!(
            clock.sample(start),
            FrameProgress {
                progress: 1.0,
                finished: true
            }
        );
    }

    #[test]
    fn progress_never_decreases() {
        let start = Instant::now() + Duration::from_millis(10);
        let mut clock = TransitionClock::new(Duration::from_millis(100), Easing::Smoothstep, start);
        let later = clock.sample(start + Duration::from_millis(60)).progress;
        // A frame stamped before the start must not roll progress back.
        let earlier = clock.sample(start - Duration::from_millis(5)).progress;
        assert!(earlier >= later);
    }
}
