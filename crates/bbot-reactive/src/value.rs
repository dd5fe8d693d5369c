//! Reactive cells: values that notify condition listeners and refresh
//! themselves through the task loop.
//!
//! # Design
//!
//! A [`ReactiveValue`] is a shared handle over one cell. Every `set`
//! evaluates the listeners registered at entry against the incoming value;
//! callbacks run with no internal borrow held, so they may freely read the
//! cell, set it again, or add and remove listeners.
//!
//! Change listeners compare against a per-cell baseline, the last value
//! that fired a change listener, rather than the previous value. A slow
//! drift therefore accumulates until it crosses the threshold once, instead
//! of being filtered away sample by sample. All change listeners of a cell
//! share that baseline.
//!
//! A cell constructed with a refresh source keeps a repeating task in the
//! scheduler exactly while it has a live listener and a non-zero period.
//! With no listeners nobody can observe the samples, so the cell stops
//! polling.
//!
//! # Invariants
//!
//! 1. `previous` always holds the value that `set` replaced, including
//!    sets of an equal value.
//! 2. A one-shot listener fires at most once; it retires before its
//!    callback runs.
//! 3. The refresh task exists iff a refresh source is set, the period is
//!    non-zero, and at least one listener is live.
//! 4. Listener ids are never reused within a cell's lifetime.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use bbot_core::{Logging, Scheduler, TaskHandle};
use web_time::Duration;

use crate::condition::Condition;
use crate::observed::Observed;

/// Identifier of a registered listener, unique per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

struct ListenerSlot<T> {
    id: u64,
    condition: Condition<T>,
    repeat: bool,
    callback: Rc<dyn Fn(&T)>,
    /// Tombstone. Set during listener evaluation, compacted afterwards.
    removed: Cell<bool>,
}

struct CellInner<T> {
    value: T,
    previous: T,
    /// Reference point for `Changed` listeners.
    baseline: T,
    ignore_unchanged: bool,
    change_threshold: Option<T>,
    listeners: Vec<ListenerSlot<T>>,
    next_listener_id: u64,
    /// Depth of nested `set` calls. Compaction waits for depth zero so
    /// slot indices stay stable while listeners fire.
    eval_depth: u32,
    refresh_period: Duration,
    refresh_fn: Option<Box<dyn FnMut() -> Option<T>>>,
    refresh_handle: Option<TaskHandle>,
    scheduler: Scheduler,
    log: Rc<Logging>,
}

impl<T> Drop for CellInner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_handle.take() {
            self.scheduler.kill(handle);
        }
    }
}

/// Shared handle to a reactive cell.
pub struct ReactiveValue<T: Observed> {
    inner: Rc<RefCell<CellInner<T>>>,
}

impl<T: Observed> Clone for ReactiveValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Observed> fmt::Debug for ReactiveValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ReactiveValue")
            .field("value", &inner.value)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<T: Observed> ReactiveValue<T> {
    /// A cell holding `initial`, with no refresh source.
    #[must_use]
    pub fn new(scheduler: &Scheduler, initial: T) -> Self {
        Self::build(scheduler, initial, Duration::ZERO, None)
    }

    /// A cell that pulls samples from `refresh` every `period` while it
    /// has listeners. The source returns `None` when it has nothing to
    /// report, which leaves the cell untouched.
    #[must_use]
    pub fn with_refresh(
        scheduler: &Scheduler,
        initial: T,
        period: Duration,
        refresh: impl FnMut() -> Option<T> + 'static,
    ) -> Self {
        Self::build(scheduler, initial, period, Some(Box::new(refresh)))
    }

    fn build(
        scheduler: &Scheduler,
        initial: T,
        period: Duration,
        refresh_fn: Option<Box<dyn FnMut() -> Option<T>>>,
    ) -> Self {
        let router = scheduler.log_router();
        Self {
            inner: Rc::new(RefCell::new(CellInner {
                previous: initial.clone(),
                baseline: initial.clone(),
                value: initial,
                ignore_unchanged: true,
                change_threshold: None,
                listeners: Vec::new(),
                next_listener_id: 0,
                eval_depth: 0,
                refresh_period: period,
                refresh_fn,
                refresh_handle: None,
                scheduler: scheduler.clone(),
                log: Rc::new(Logging::new("reactive", &router)),
            })),
        }
    }

    // ─── Reading ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// The value the latest `set` replaced.
    #[must_use]
    pub fn get_previous(&self) -> T {
        self.inner.borrow().previous.clone()
    }

    /// Pull a fresh sample through the refresh source, then read.
    #[must_use]
    pub fn get_forced(&self) -> T {
        self.refresh();
        self.get()
    }

    /// Run the refresh source once, feeding its sample through `set`.
    /// Does nothing when the cell has no source.
    pub fn refresh(&self) {
        let sample = {
            let taken = self.inner.borrow_mut().refresh_fn.take();
            let Some(mut refresh_fn) = taken else {
                return;
            };
            let sample = refresh_fn();
            let mut inner = self.inner.borrow_mut();
            if inner.refresh_fn.is_none() {
                inner.refresh_fn = Some(refresh_fn);
            }
            sample
        };
        self.update(sample);
    }

    // ─── Writing ─────────────────────────────────────────────────────────────

    /// Feed an optional sample. `None` is a no-op.
    pub fn update(&self, sample: Option<T>) {
        if let Some(value) = sample {
            self.set(value);
        }
    }

    /// Store `value` and evaluate the listeners registered at entry.
    ///
    /// With the unchanged filter on (the default) a value that tolerantly
    /// equals the current one skips every conditional listener; `AnyUpdate`
    /// listeners fire regardless. Callbacks run with no borrow held and may
    /// mutate the cell and its listeners freely; listeners added by a
    /// callback wait for the next set.
    pub fn set(&self, value: T) {
        let (same, upper) = {
            let mut inner = self.inner.borrow_mut();
            let same = inner.ignore_unchanged && value.tolerant_eq(&inner.value);
            inner.previous = mem::replace(&mut inner.value, value.clone());
            inner.eval_depth += 1;
            (same, inner.listeners.len())
        };

        let mut fired_changed = false;
        for index in 0..upper {
            let callback = {
                let inner = self.inner.borrow();
                let Some(slot) = inner.listeners.get(index) else {
                    break;
                };
                if slot.removed.get() {
                    continue;
                }
                let hit = match &slot.condition {
                    Condition::AnyUpdate => true,
                    _ if same => false,
                    condition => condition.matches(
                        &value,
                        &inner.baseline,
                        inner.change_threshold.as_ref(),
                    ),
                };
                if !hit {
                    continue;
                }
                if !slot.repeat {
                    // Retire one-shot slots up front so a nested set
                    // cannot fire them a second time.
                    slot.removed.set(true);
                }
                if matches!(slot.condition, Condition::Changed) {
                    fired_changed = true;
                }
                Rc::clone(&slot.callback)
            };
            callback(&value);
        }

        {
            let mut inner = self.inner.borrow_mut();
            if fired_changed {
                inner.baseline = value.clone();
            }
            inner.eval_depth -= 1;
            if inner.eval_depth == 0 {
                inner.listeners.retain(|slot| !slot.removed.get());
            }
        }
        self.sync_refresh_task();
    }

    /// Toggle the unchanged filter.
    pub fn set_ignore_unchanged(&self, ignore: bool) {
        self.inner.borrow_mut().ignore_unchanged = ignore;
    }

    /// Set or clear the change threshold. Without one, any evaluated set
    /// counts as a change.
    pub fn set_change_threshold(&self, threshold: Option<T>) {
        self.inner.borrow_mut().change_threshold = threshold;
    }

    /// Retarget the refresh task to `period`. Zero stops scheduled
    /// refreshes; explicit [`refresh`](Self::refresh) calls still work.
    pub fn change_period(&self, period: Duration) {
        let stale = {
            let mut inner = self.inner.borrow_mut();
            inner.refresh_period = period;
            inner.refresh_handle.take()
        };
        if let Some(handle) = stale {
            self.scheduler().kill(handle);
        }
        self.sync_refresh_task();
    }

    // ─── Listeners ───────────────────────────────────────────────────────────

    pub fn on_equal(&self, expected: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::EqualTo(expected), true, Rc::new(callback))
    }

    pub fn on_equal_once(&self, expected: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::EqualTo(expected), false, Rc::new(callback))
    }

    pub fn on_not_equal(&self, expected: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::NotEqualTo(expected), true, Rc::new(callback))
    }

    pub fn on_not_equal_once(&self, expected: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::NotEqualTo(expected), false, Rc::new(callback))
    }

    pub fn on_less_than(&self, limit: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::LessThan(limit), true, Rc::new(callback))
    }

    pub fn on_less_than_once(&self, limit: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::LessThan(limit), false, Rc::new(callback))
    }

    pub fn on_more_than(&self, limit: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::MoreThan(limit), true, Rc::new(callback))
    }

    pub fn on_more_than_once(&self, limit: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::MoreThan(limit), false, Rc::new(callback))
    }

    /// Fires while `min <= value < max`.
    pub fn on_in_range(&self, min: T, max: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::InRange { min, max }, true, Rc::new(callback))
    }

    pub fn on_in_range_once(&self, min: T, max: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::InRange { min, max }, false, Rc::new(callback))
    }

    /// Fires while `value < min` or `value >= max`.
    pub fn on_out_of_range(&self, min: T, max: T, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::OutOfRange { min, max }, true, Rc::new(callback))
    }

    pub fn on_out_of_range_once(
        &self,
        min: T,
        max: T,
        callback: impl Fn(&T) + 'static,
    ) -> ListenerId {
        self.add_listener(Condition::OutOfRange { min, max }, false, Rc::new(callback))
    }

    /// Fires when the value moves at least the change threshold away from
    /// the shared baseline. Without a threshold, every evaluated set fires.
    pub fn on_changed(&self, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::Changed, true, Rc::new(callback))
    }

    pub fn on_changed_once(&self, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::Changed, false, Rc::new(callback))
    }

    /// Fires on every set, even of an unchanged value.
    pub fn on_updated(&self, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::AnyUpdate, true, Rc::new(callback))
    }

    pub fn on_updated_once(&self, callback: impl Fn(&T) + 'static) -> ListenerId {
        self.add_listener(Condition::AnyUpdate, false, Rc::new(callback))
    }

    fn add_listener(
        &self,
        condition: Condition<T>,
        repeat: bool,
        callback: Rc<dyn Fn(&T)>,
    ) -> ListenerId {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.push(ListenerSlot {
                id,
                condition,
                repeat,
                callback,
                removed: Cell::new(false),
            });
            id
        };
        self.sync_refresh_task();
        ListenerId(id)
    }

    /// Remove a listener. Returns false for unknown or already-removed
    /// ids.
    pub fn remove(&self, id: ListenerId) -> bool {
        let found = {
            let inner = self.inner.borrow();
            match inner
                .listeners
                .iter()
                .find(|slot| slot.id == id.0 && !slot.removed.get())
            {
                Some(slot) => {
                    slot.removed.set(true);
                    true
                }
                None => false,
            }
        };
        if !found {
            return false;
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.eval_depth == 0 {
                inner.listeners.retain(|slot| !slot.removed.get());
            }
        }
        self.sync_refresh_task();
        true
    }

    /// Drop every listener and stop the refresh task.
    pub fn remove_all(&self) {
        let stale = {
            let mut inner = self.inner.borrow_mut();
            if inner.eval_depth == 0 {
                inner.listeners.clear();
            } else {
                for slot in &inner.listeners {
                    slot.removed.set(true);
                }
            }
            inner.refresh_handle.take()
        };
        if let Some(handle) = stale {
            self.scheduler().kill(handle);
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|slot| !slot.removed.get())
            .count()
    }

    // ─── Refresh task ────────────────────────────────────────────────────────

    pub(crate) fn scheduler(&self) -> Scheduler {
        self.inner.borrow().scheduler.clone()
    }

    /// Keep the scheduled refresh task in lockstep with demand: it exists
    /// exactly while a source, a non-zero period and a live listener are
    /// all present.
    fn sync_refresh_task(&self) {
        enum Action {
            Stay,
            Kill(TaskHandle),
            Spawn(Duration),
        }

        let action = {
            let mut inner = self.inner.borrow_mut();
            let wanted = inner.refresh_fn.is_some()
                && !inner.refresh_period.is_zero()
                && inner.listeners.iter().any(|slot| !slot.removed.get());
            if wanted && inner.refresh_handle.is_none() {
                Action::Spawn(inner.refresh_period)
            } else if wanted {
                Action::Stay
            } else {
                match inner.refresh_handle.take() {
                    Some(handle) => Action::Kill(handle),
                    None => Action::Stay,
                }
            }
        };

        match action {
            Action::Stay => {}
            Action::Kill(handle) => {
                self.scheduler().kill(handle);
            }
            Action::Spawn(period) => {
                let weak = Rc::downgrade(&self.inner);
                let planned = self.scheduler().repeat(period, move || {
                    if let Some(inner) = weak.upgrade() {
                        ReactiveValue { inner }.refresh();
                    }
                    Ok(())
                });
                match planned {
                    Ok(handle) => self.inner.borrow_mut().refresh_handle = Some(handle),
                    Err(error) => {
                        let log = Rc::clone(&self.inner.borrow().log);
                        log.error(&format!("refresh task not scheduled: {error}"));
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
