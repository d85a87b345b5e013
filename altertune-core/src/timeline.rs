//! Clocks the scheduler and the audio backend agree on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic clock in fractional seconds.
///
/// The scheduler and the note sink must read the same timeline, or onsets drift.
pub trait Timeline: Send + Sync {
    fn now(&self) -> f64;
}

impl<T: Timeline + ?Sized> Timeline for Arc<T> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Seconds since construction, from the OS monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeline {
    origin: Instant,
}

impl SystemTimeline {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline for SystemTimeline {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeline(Arc<AtomicU64>);

impl ManualTimeline {
    pub fn new(start: f64) -> Self {
        Self(Arc::new(AtomicU64::new(start.to_bits())))
    }

    pub fn set(&self, t: f64) {
        self.0.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl Timeline for ManualTimeline {
    fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }
}
