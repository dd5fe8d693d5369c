//! Time source abstraction for the scheduler loop.
//!
//! All core time arithmetic goes through a [`Clock`] handle instead of
//! calling `Instant::now()` directly. In production the clock reads real
//! wall time; in tests it is backed by a [`ManualClock`] that only moves
//! when the test advances it, enabling fully reproducible runs without
//! real sleeping.
//!
//! # Design
//!
//! `Clock` is cheaply cloneable and immutable from the outside. All clones
//! backed by the same `ManualClock` see the same time.
//!
//! # Example
//!
//! ```
//! use bbot_core::clock::{Clock, ManualClock};
//! use web_time::Duration;
//!
//! let manual = ManualClock::new();
//! let clock = Clock::manual(&manual);
//!
//! let before = clock.now();
//! manual.advance(Duration::from_millis(250));
//! assert_eq!(clock.now() - before, Duration::from_millis(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_time::{Duration, Instant};

/// A manually-advanceable clock for deterministic tests.
///
/// All [`Clock`] handles sharing the same `ManualClock` see the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Current manual time.
    #[must_use]
    pub fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_us.load(Ordering::Acquire));
        self.epoch + offset
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum TimeSource {
    /// Real wall-clock time; sleeping suspends the thread.
    Real,
    /// Manual time; sleeping advances the clock instead of blocking.
    Manual(ManualClock),
}

/// Handle through which the scheduler reads time and sleeps.
#[derive(Debug, Clone)]
pub struct Clock {
    source: TimeSource,
}

impl Clock {
    /// A clock reading real wall time.
    #[must_use]
    pub fn real() -> Self {
        Self {
            source: TimeSource::Real,
        }
    }

    /// A clock driven by `manual`. Sleeps advance the manual clock by the
    /// requested duration, so loops that sleep make deterministic progress.
    #[must_use]
    pub fn manual(manual: &ManualClock) -> Self {
        Self {
            source: TimeSource::Manual(manual.clone()),
        }
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> Instant {
        match &self.source {
            TimeSource::Real => Instant::now(),
            TimeSource::Manual(manual) => manual.now(),
        }
    }

    /// Bounded sleep for `duration`.
    pub fn sleep(&self, duration: Duration) {
        match &self.source {
            TimeSource::Real => std::thread::sleep(duration),
            TimeSource::Manual(manual) => manual.advance(duration),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::real()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
