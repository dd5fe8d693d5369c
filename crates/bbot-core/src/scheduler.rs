//! Cooperative task scheduler and idle loop.
//!
//! The scheduler owns a table of closure tasks keyed by monotonically
//! increasing [`TaskHandle`]s. Tasks run to completion on the single loop
//! thread; nothing preempts them. Between dispatch rounds the loop consults
//! [`choose_idle`] to decide whether to yield, sleep until the next
//! deadline, or hand the gap to the power policy as a low-power excursion.
//!
//! # Design
//!
//! - Ready tasks dispatch in handle order, which is registration order
//!   (FIFO among tasks due at the same instant).
//! - A repeating task's next deadline is measured from the end of the
//!   previous run, not from its nominal start, so a slow action stretches
//!   the effective period instead of causing catch-up bursts.
//! - Task failures are reported through the logging collaborator and never
//!   propagate. One misbehaving task cannot take the loop down, and a
//!   failing repeating task keeps its slot.
//! - Killing is a lazy tombstone. The entry is swept on the next dispatch
//!   round or maintenance pass, never mid-run.
//!
//! # Invariants
//!
//! 1. Handles are never reused within a scheduler's lifetime.
//! 2. At most one task action runs at any instant.
//! 3. A killed task never runs again, even if it was already due.
//! 4. The loop enters low power only when the power policy allows it and
//!    the gap exceeds the light-sleep threshold.
//!
//! # Example
//!
//! ```
//! use bbot_core::{Clock, LogRouter, ManualClock, ManualLowPower, PowerPolicy, Scheduler};
//!
//! let manual = ManualClock::new();
//! let router = LogRouter::new();
//! let power = PowerPolicy::new(ManualLowPower::new(&manual), &router);
//! let scheduler = Scheduler::new(Clock::manual(&manual), power, &router);
//!
//! let handle = scheduler.plan(|| {
//!     println!("hello from the task loop");
//!     Ok(())
//! });
//! assert_eq!(scheduler.run_until_idle(), 1);
//! assert!(!scheduler.is_alive(handle));
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use web_time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::idle::{IdleChoice, choose_idle, wants_maintenance};
use crate::logging::{LogRouter, Logging};
use crate::power::PowerPolicy;
use crate::task::{TaskHandle, TaskResult};

/// Marker opening every failure report from the task boundary.
const UNHANDLED_EXCEPTION: &str = "Unhandled exception";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Loop tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Gaps longer than this are eligible for maintenance and low power.
    /// Low-power excursions wake this much before the next deadline.
    pub light_sleep_threshold: Duration,
    /// Nap length when tasks are ready or the table is empty.
    pub yield_slice: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            light_sleep_threshold: Duration::from_millis(100),
            yield_slice: Duration::from_millis(10),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_light_sleep_threshold(mut self, threshold: Duration) -> Self {
        self.light_sleep_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_yield_slice(mut self, slice: Duration) -> Self {
        self.yield_slice = slice;
        self
    }
}

// ─── Task table ──────────────────────────────────────────────────────────────

enum TaskKind {
    Once,
    Repeating { period: Duration },
}

struct TaskEntry {
    /// Taken out of the entry while the action runs, so the table can be
    /// borrowed re-entrantly from inside a task.
    action: Option<Box<dyn FnMut() -> TaskResult>>,
    kind: TaskKind,
    due_at: Instant,
    kill_requested: bool,
}

struct SchedulerInner {
    tasks: BTreeMap<u64, TaskEntry>,
    next_handle: u64,
    maintenance_hook: Option<Box<dyn FnMut()>>,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Shared handle to the task loop. Cloning yields another handle to the
/// same task table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: Clock,
    power: PowerPolicy,
    router: LogRouter,
    log: Rc<Logging>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Clock, power: PowerPolicy, router: &LogRouter) -> Self {
        Self::with_config(clock, power, router, SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_config(
        clock: Clock,
        power: PowerPolicy,
        router: &LogRouter,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                tasks: BTreeMap::new(),
                next_handle: 0,
                maintenance_hook: None,
            })),
            clock,
            power,
            router: router.clone(),
            log: Rc::new(Logging::new("planner", router)),
            config,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn power(&self) -> &PowerPolicy {
        &self.power
    }

    /// The router this scheduler reports through, for wiring collaborator
    /// façades to the same sinks.
    #[must_use]
    pub fn log_router(&self) -> LogRouter {
        self.router.clone()
    }

    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Run `action` once, as soon as the loop gets to it.
    pub fn plan(&self, action: impl FnMut() -> TaskResult + 'static) -> TaskHandle {
        self.insert(TaskKind::Once, Duration::ZERO, Box::new(action))
    }

    /// Run `action` once after at least `delay`.
    pub fn postpone(
        &self,
        delay: Duration,
        action: impl FnMut() -> TaskResult + 'static,
    ) -> TaskHandle {
        self.insert(TaskKind::Once, delay, Box::new(action))
    }

    /// Run `action` repeatedly with `period` between the end of one run and
    /// the start of the next. The first run is due immediately.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ZeroPeriod`] when `period` is zero, which would
    /// starve every other task.
    pub fn repeat(
        &self,
        period: Duration,
        action: impl FnMut() -> TaskResult + 'static,
    ) -> Result<TaskHandle> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        Ok(self.insert(TaskKind::Repeating { period }, Duration::ZERO, Box::new(action)))
    }

    /// Kill `handle` and register `action` as a fresh repeating task with
    /// the new `period`. Returns the replacement handle.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ZeroPeriod`] for a zero `period`,
    /// [`SchedulerError::UnknownHandle`] when `handle` is not alive.
    pub fn change_period(
        &self,
        handle: TaskHandle,
        period: Duration,
        action: impl FnMut() -> TaskResult + 'static,
    ) -> Result<TaskHandle> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        if !self.kill(handle) {
            return Err(SchedulerError::UnknownHandle(handle));
        }
        Ok(self.insert(TaskKind::Repeating { period }, Duration::ZERO, Box::new(action)))
    }

    fn insert(
        &self,
        kind: TaskKind,
        delay: Duration,
        action: Box<dyn FnMut() -> TaskResult>,
    ) -> TaskHandle {
        let due_at = self.clock.now() + delay;
        let mut inner = self.inner.borrow_mut();
        let raw = inner.next_handle;
        inner.next_handle += 1;
        inner.tasks.insert(
            raw,
            TaskEntry {
                action: Some(action),
                kind,
                due_at,
                kill_requested: false,
            },
        );
        TaskHandle::new(raw)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Request that `handle` never runs again. Returns true when the handle
    /// was alive, false for unknown or already-killed handles.
    pub fn kill(&self, handle: TaskHandle) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.tasks.get_mut(&handle.raw()) {
            Some(entry) if !entry.kill_requested => {
                entry.kill_requested = true;
                true
            }
            _ => false,
        }
    }

    /// True while `handle` is scheduled, waiting or running and not killed.
    #[must_use]
    pub fn is_alive(&self, handle: TaskHandle) -> bool {
        self.inner
            .borrow()
            .tasks
            .get(&handle.raw())
            .is_some_and(|entry| !entry.kill_requested)
    }

    /// Number of live tasks in the table.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner
            .borrow()
            .tasks
            .values()
            .filter(|entry| !entry.kill_requested)
            .count()
    }

    /// Install the housekeeping hook run during wide idle gaps. Replaces
    /// any previous hook.
    pub fn set_maintenance_hook(&self, hook: impl FnMut() + 'static) {
        self.inner.borrow_mut().maintenance_hook = Some(Box::new(hook));
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Run every task due now, in handle order. Returns how many ran.
    /// Tasks registered during the round wait for the next one.
    fn dispatch_ready(&self) -> usize {
        let now = self.clock.now();
        let (ready, dead) = {
            let inner = self.inner.borrow();
            let mut ready = Vec::new();
            let mut dead = Vec::new();
            for (&raw, entry) in &inner.tasks {
                if entry.action.is_none() {
                    continue;
                }
                if entry.kill_requested {
                    dead.push(raw);
                } else if entry.due_at <= now {
                    ready.push(raw);
                }
            }
            (ready, dead)
        };

        if !dead.is_empty() {
            let mut inner = self.inner.borrow_mut();
            for raw in dead {
                inner.tasks.remove(&raw);
            }
        }

        let mut executed = 0;
        for raw in ready {
            if self.run_one(raw) {
                executed += 1;
            }
        }
        executed
    }

    /// Run a single task with no table borrow held, so the action can plan,
    /// kill and reschedule freely.
    fn run_one(&self, raw: u64) -> bool {
        let mut action = {
            let mut inner = self.inner.borrow_mut();
            let Some(entry) = inner.tasks.get_mut(&raw) else {
                return false;
            };
            if entry.kill_requested {
                inner.tasks.remove(&raw);
                return false;
            }
            let Some(action) = entry.action.take() else {
                return false;
            };
            action
        };

        if let Err(error) = action() {
            self.log.exception(&error, Some(UNHANDLED_EXCEPTION));
        }

        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.tasks.get_mut(&raw) {
            match entry.kind {
                TaskKind::Repeating { period } if !entry.kill_requested => {
                    entry.due_at = self.clock.now() + period;
                    entry.action = Some(action);
                }
                _ => {
                    inner.tasks.remove(&raw);
                }
            }
        }
        true
    }

    /// Time until the earliest live deadline, zero when a task is already
    /// due, `None` when the table holds no runnable task.
    fn min_remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.inner
            .borrow()
            .tasks
            .values()
            .filter(|entry| !entry.kill_requested && entry.action.is_some())
            .map(|entry| entry.due_at.saturating_duration_since(now))
            .min()
    }

    /// Sweep tombstones and run the housekeeping hook.
    fn run_maintenance(&self) {
        let hook = {
            let mut inner = self.inner.borrow_mut();
            inner
                .tasks
                .retain(|_, entry| !entry.kill_requested || entry.action.is_none());
            inner.maintenance_hook.take()
        };
        if let Some(mut hook) = hook {
            hook();
            let mut inner = self.inner.borrow_mut();
            if inner.maintenance_hook.is_none() {
                inner.maintenance_hook = Some(hook);
            }
        }
    }

    // ─── Loop ────────────────────────────────────────────────────────────────

    /// One dispatch round plus one idle action, optionally capping every
    /// nap at `budget`.
    fn step(&self, budget: Option<Duration>) -> IdleChoice {
        self.dispatch_ready();

        let mut remaining = self.min_remaining();
        if wants_maintenance(remaining, self.config.light_sleep_threshold) {
            self.run_maintenance();
            remaining = self.min_remaining();
        }

        let choice = choose_idle(
            remaining,
            self.power.is_power_save_allowed(),
            self.config.light_sleep_threshold,
        );
        let capped = |duration: Duration| match budget {
            Some(budget) => duration.min(budget),
            None => duration,
        };
        match choice {
            IdleChoice::Yield => self.clock.sleep(capped(self.config.yield_slice)),
            IdleChoice::Sleep(duration) => self.clock.sleep(capped(duration)),
            IdleChoice::LowPower(duration) => {
                let nap = capped(duration);
                if !nap.is_zero() {
                    self.log
                        .debug(&format!("entering low power for {} ms", nap.as_millis()));
                    self.power.enter_low_power(nap);
                }
                self.clock.sleep(Duration::ZERO);
            }
        }
        choice
    }

    /// One loop iteration. Exposed for host builds that interleave the
    /// task loop with another event source.
    pub fn tick(&self) -> IdleChoice {
        self.step(None)
    }

    /// Enter the loop and never return.
    pub fn run(&self) -> ! {
        loop {
            self.step(None);
        }
    }

    /// Run the loop for roughly `duration` of clock time, capping naps so
    /// the deadline is honored.
    pub fn run_for(&self, duration: Duration) {
        let deadline = self.clock.now() + duration;
        loop {
            let budget = deadline.saturating_duration_since(self.clock.now());
            if budget.is_zero() {
                return;
            }
            self.step(Some(budget));
        }
    }

    /// Dispatch until no task is due at the current clock reading, without
    /// sleeping or advancing time. Returns how many task runs happened.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let executed = self.dispatch_ready();
            if executed == 0 {
                return total;
            }
            total += executed;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
