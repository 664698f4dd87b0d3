use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Abstraction over where frame timestamps come from.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time, so a host
/// can keep one copy and hand another to the carousel.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, step: Duration) {
        self.now.set(self.now.get() + step);
    }

    pub fn set(&self, instant: Instant) {
        self.now.set(instant);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

pub type BoxedClock = Box<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance(Duration::from_millis(16));
        assert_eq!(clock.now(), start + Duration::from_millis(16));
    }
}
