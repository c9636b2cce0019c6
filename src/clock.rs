//! Session clock

use std::cell::Cell;
use std::time::Instant;

/// Identifier written to the `clock_source` metadata line
pub const CLOCK_SOURCE: &str = "std::time::Instant";

/// Monotonic elapsed-time source relative to session start
pub trait Clock {
    /// Milliseconds since the clock was started. Never decreases.
    fn elapsed_ms(&self) -> f64;

    /// Restart the clock at 0.0
    fn restart(&mut self);
}

/// Wall-independent clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_nanos() as f64 / 1e6
    }

    fn restart(&mut self) {
        self.start = Instant::now();
    }
}

/// Clock that only moves when told to. Each reading advances it by a
/// fixed step, which keeps recorded timestamps predictable.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Cell<f64>,
    step_ms: f64,
}

impl ManualClock {
    pub fn new(step_ms: f64) -> Self {
        Self {
            now_ms: Cell::new(0.0),
            step_ms: step_ms.max(0.0),
        }
    }

    /// Move the clock forward. Negative amounts are ignored.
    pub fn advance(&self, ms: f64) {
        if ms > 0.0 {
            self.now_ms.set(self.now_ms.get() + ms);
        }
    }
}

impl Clock for ManualClock {
    fn elapsed_ms(&self) -> f64 {
        let now = self.now_ms.get();
        self.now_ms.set(now + self.step_ms);
        now
    }

    fn restart(&mut self) {
        self.now_ms.set(0.0);
    }
}
