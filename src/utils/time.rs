// src/utils/time.rs
//! Clocks used by the protocol timing loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time provider trait for dependency injection and testing
///
/// `now_nanos` is measured from an arbitrary per-provider origin, so only
/// differences between readings are meaningful.
pub trait TimeProvider: Send + Sync {
    fn now_nanos(&self) -> u64;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }
}

/// Monotonic time provider backed by `Instant` and `thread::sleep`
pub struct MonotonicTimeProvider {
    origin: Instant,
}

impl MonotonicTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MonotonicTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Mock time provider for deterministic testing
///
/// Sleeping advances virtual time instantly, so a whole session can be
/// replayed without waiting on the wall clock.
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_nanos: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_nanos),
        }
    }

    pub fn advance_by(&self, nanos: u64) {
        self.current_time.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn set_time(&self, nanos: u64) {
        self.current_time.store(nanos, Ordering::Relaxed);
    }
}

impl Default for MockTimeProvider {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }

    fn sleep(&self, duration: Duration) {
        self.advance_by(duration.as_nanos() as u64);
    }
}

/// Convert a frequency in Hz to its period, `None` for non-positive input
pub fn frequency_to_period(frequency_hz: f64) -> Option<Duration> {
    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        Some(Duration::from_secs_f64(1.0 / frequency_hz))
    } else {
        None
    }
}
