//! Pure idle-step decision logic.
//!
//! Extracted from the scheduler loop so the policy is testable without a
//! clock or task table. Given the time until the next task is due and the
//! current power-save gate, [`choose_idle`] picks how the loop should spend
//! the gap.
//!
//! # Decision table
//!
//! | next due                         | power save | choice              |
//! |----------------------------------|------------|---------------------|
//! | none, or already due             | any        | `Yield`             |
//! | `remaining <= threshold`         | any        | `Sleep(remaining)`  |
//! | `remaining > threshold`          | blocked    | `Sleep(remaining)`  |
//! | `remaining > threshold`          | allowed    | `LowPower(remaining - threshold)` |
//!
//! Low power wakes `threshold` early so the ordinary sleep path covers
//! wake-up jitter before the task is due.

use web_time::Duration;

/// How the scheduler should spend an idle gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleChoice {
    /// Tasks are ready or none are waiting. Yield briefly and re-check.
    Yield,
    /// Busy-wait-free nap for the full remaining time.
    Sleep(Duration),
    /// Enter low power, waking one threshold early.
    LowPower(Duration),
}

/// Pick the idle action for a gap of `min_remaining` until the next due
/// task (`None` when no task is waiting).
#[must_use]
pub fn choose_idle(
    min_remaining: Option<Duration>,
    power_save_allowed: bool,
    light_sleep_threshold: Duration,
) -> IdleChoice {
    match min_remaining {
        None => IdleChoice::Yield,
        Some(remaining) if remaining.is_zero() => IdleChoice::Yield,
        Some(remaining) => {
            if !power_save_allowed || remaining <= light_sleep_threshold {
                IdleChoice::Sleep(remaining)
            } else {
                IdleChoice::LowPower(remaining - light_sleep_threshold)
            }
        }
    }
}

/// True when the gap is wide enough to spend part of it on housekeeping
/// before committing to a sleep.
#[must_use]
pub fn wants_maintenance(min_remaining: Option<Duration>, light_sleep_threshold: Duration) -> bool {
    matches!(min_remaining, Some(remaining) if remaining > light_sleep_threshold)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
