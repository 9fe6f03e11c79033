//! Pluggable time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic ticks and wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic nanoseconds since an arbitrary origin.
    fn tick(&self) -> u64;

    /// Milliseconds since the Unix epoch.
    fn time_millis(&self) -> u64;
}

/// The process clock: `Instant` for ticks, `chrono::Utc` for wall time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn tick(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn time_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Shared default clock.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock::new())
}

/// A clock that only moves when told to.
///
/// Both readings advance together, so code mixing `tick()` and
/// `time_millis()` sees a consistent timeline.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    epoch_millis: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Wall clock starts at `epoch_millis`; ticks start at zero.
    pub fn starting_at(epoch_millis: u64) -> Self {
        Self {
            nanos: AtomicU64::new(0),
            epoch_millis,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn tick(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }

    fn time_millis(&self) -> u64 {
        self.epoch_millis + self.nanos.load(Ordering::SeqCst) / 1_000_000
    }
}
