//! Power plans, the power-save gate and the low-power entry point.
//!
//! [`PowerPolicy`] is the single authority the scheduler consults before
//! entering low power. It combines a selected [`PowerPlan`] with a block
//! counter raised by subsystems that cannot tolerate a low-power excursion
//! (an active radio link, a motor ramp). The actual hardware transition is
//! behind the [`LowPowerDriver`] trait so host builds and tests can swap in
//! a fake.
//!
//! # Invariants
//!
//! 1. Low power is allowed only when the plan permits it and no block is
//!    held.
//! 2. `block` and `unblock` calls balance; an excess `unblock` clamps at
//!    zero and logs a warning instead of underflowing.
//! 3. Changing the plan notifies registered callbacks before the new CPU
//!    frequency is applied.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

use web_time::Duration;

use crate::clock::ManualClock;
use crate::logging::{LogRouter, Logging};

// ─── Driver boundary ─────────────────────────────────────────────────────────

/// Hardware operations the policy needs. Implementations must not call back
/// into [`PowerPolicy`].
pub trait LowPowerDriver {
    /// Suspend for roughly `duration`. Wall time may overshoot; the
    /// scheduler re-checks deadlines on wake.
    fn enter_low_power(&self, duration: Duration);

    /// Set the CPU core frequency in hertz.
    fn apply_frequency(&self, hz: u32);
}

/// Host-side driver: low power is a plain blocking sleep and frequency
/// requests are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSleepDriver;

impl LowPowerDriver for HostSleepDriver {
    fn enter_low_power(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn apply_frequency(&self, _hz: u32) {}
}

/// Test driver bound to a [`ManualClock`]: entering low power advances the
/// clock and records the requested duration.
#[derive(Clone)]
pub struct ManualLowPower {
    clock: ManualClock,
    entered: Rc<RefCell<Vec<Duration>>>,
}

impl ManualLowPower {
    #[must_use]
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            entered: Rc::default(),
        }
    }

    /// Durations of every low-power entry so far, oldest first.
    #[must_use]
    pub fn entered(&self) -> Vec<Duration> {
        self.entered.borrow().clone()
    }
}

impl LowPowerDriver for ManualLowPower {
    fn enter_low_power(&self, duration: Duration) {
        self.entered.borrow_mut().push(duration);
        self.clock.advance(duration);
    }

    fn apply_frequency(&self, _hz: u32) {}
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// A named point on the performance/consumption curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerPlan {
    /// Whether the idle loop may use low-power sleeps under this plan.
    pub allows_power_save: bool,
    /// CPU core frequency the plan runs at.
    pub frequency_hz: u32,
}

impl PowerPlan {
    pub const FREQ_MAX_HZ: u32 = 240_000_000;
    pub const FREQ_MEDIUM_HZ: u32 = 160_000_000;
    pub const FREQ_MIN_HZ: u32 = 80_000_000;

    /// Full clock, never sleeps. For latency-critical demos.
    #[must_use]
    pub const fn max_performance() -> Self {
        Self {
            allows_power_save: false,
            frequency_hz: Self::FREQ_MAX_HZ,
        }
    }

    /// Medium clock with power save. The boot default.
    #[must_use]
    pub const fn balanced() -> Self {
        Self {
            allows_power_save: true,
            frequency_hz: Self::FREQ_MEDIUM_HZ,
        }
    }

    /// Lowest clock, maximum battery life.
    #[must_use]
    pub const fn power_saving() -> Self {
        Self {
            allows_power_save: true,
            frequency_hz: Self::FREQ_MIN_HZ,
        }
    }
}

impl Default for PowerPlan {
    fn default() -> Self {
        Self::balanced()
    }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

struct PolicyInner {
    block_count: u32,
    plan: PowerPlan,
    driver: Box<dyn LowPowerDriver>,
    change_callbacks: Vec<Rc<dyn Fn(&PowerPlan)>>,
}

/// Shared power authority. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct PowerPolicy {
    inner: Rc<RefCell<PolicyInner>>,
    log: Rc<Logging>,
}

impl PowerPolicy {
    /// A policy starting on the [`PowerPlan::balanced`] plan with no blocks
    /// held.
    #[must_use]
    pub fn new(driver: impl LowPowerDriver + 'static, router: &LogRouter) -> Self {
        let plan = PowerPlan::default();
        driver.apply_frequency(plan.frequency_hz);
        Self {
            inner: Rc::new(RefCell::new(PolicyInner {
                block_count: 0,
                plan,
                driver: Box::new(driver),
                change_callbacks: Vec::new(),
            })),
            log: Rc::new(Logging::new("power", router)),
        }
    }

    /// Hold off low power until the matching [`unblock`](Self::unblock).
    pub fn block(&self) {
        self.inner.borrow_mut().block_count += 1;
    }

    /// Release one block. Clamps at zero when unbalanced.
    pub fn unblock(&self) {
        let mut inner = self.inner.borrow_mut();
        match inner.block_count.checked_sub(1) {
            Some(count) => inner.block_count = count,
            None => {
                drop(inner);
                self.log.warning("unbalanced power-save unblock");
            }
        }
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.inner.borrow().block_count
    }

    /// True when the idle loop may use low-power sleeps right now.
    #[must_use]
    pub fn is_power_save_allowed(&self) -> bool {
        let inner = self.inner.borrow();
        inner.plan.allows_power_save && inner.block_count == 0
    }

    #[must_use]
    pub fn plan(&self) -> PowerPlan {
        self.inner.borrow().plan
    }

    /// Switch plans: store, notify callbacks, then retune the CPU.
    pub fn set_plan(&self, plan: PowerPlan) {
        let callbacks: Vec<Rc<dyn Fn(&PowerPlan)>> = {
            let mut inner = self.inner.borrow_mut();
            inner.plan = plan;
            inner.change_callbacks.clone()
        };
        for callback in callbacks {
            callback(&plan);
        }
        self.inner.borrow().driver.apply_frequency(plan.frequency_hz);
    }

    /// Run `callback` on every future plan change.
    pub fn on_plan_change(&self, callback: impl Fn(&PowerPlan) + 'static) {
        self.inner
            .borrow_mut()
            .change_callbacks
            .push(Rc::new(callback));
    }

    /// Drop to the minimum frequency, enter low power for `duration`, then
    /// restore the plan frequency.
    pub fn enter_low_power(&self, duration: Duration) {
        let inner = self.inner.borrow();
        inner.driver.apply_frequency(PowerPlan::FREQ_MIN_HZ);
        inner.driver.enter_low_power(duration);
        inner.driver.apply_frequency(inner.plan.frequency_hz);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
