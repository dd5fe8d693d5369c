//! E2E scenarios for the observation layer driven through the task loop.
//!
//! Validates:
//! 1. A refresh-backed quantity cell samples on schedule while listened,
//!    fires its alarm exactly once at the crossing, renders through the
//!    unit table, and stops sampling when the last listener leaves.
//! 2. A smoothing window suppresses single-sample spikes and passes
//!    sustained changes through to threshold listeners.
//! 3. Composite readings honor per-element change thresholds against a
//!    moving baseline.
//! 4. Dropping every cell handle retires the refresh task it spawned.

#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bbot_core::{Clock, LogRouter, ManualClock, ManualLowPower, MemorySink, PowerPolicy, Scheduler};
use bbot_reactive::{QuantityCell, QuantityKind, ReactiveValue, SmoothedValue, SmoothingMode};
use web_time::Duration;

// ── Fixture ─────────────────────────────────────────────────────────────

struct Rig {
    scheduler: Scheduler,
    manual: ManualClock,
    driver: ManualLowPower,
}

fn rig() -> Rig {
    let manual = ManualClock::new();
    let driver = ManualLowPower::new(&manual);
    let router = LogRouter::new();
    router.add_sink(MemorySink::new());
    let power = PowerPolicy::new(driver.clone(), &router);
    let scheduler = Scheduler::new(Clock::manual(&manual), power, &router);
    Rig {
        scheduler,
        manual,
        driver,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn battery_monitor_samples_fires_once_and_idles_when_unwatched() {
    let r = rig();

    // Simulated ADC: each read sags by 0.4 V, starting at 4.2.
    let reads = Rc::new(Cell::new(0u32));
    let adc = Rc::clone(&reads);
    let battery = QuantityCell::with_refresh(
        &r.scheduler,
        QuantityKind::voltage().named("bat"),
        4.1,
        Duration::from_millis(250),
        move || {
            let n = adc.get();
            adc.set(n + 1);
            Some(4.2 - 0.4 * f64::from(n))
        },
    );

    // No listener yet, so no sampling task either.
    assert_eq!(r.scheduler.task_count(), 0);
    r.scheduler.run_for(Duration::from_millis(300));
    assert_eq!(reads.get(), 0);

    let alarms = Rc::new(RefCell::new(Vec::new()));
    let alarm_log = Rc::clone(&alarms);
    battery.cell().on_less_than_once(3.2, move |sag| {
        alarm_log.borrow_mut().push(*sag);
    });
    let trace = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&trace);
    let watching = battery.cell().on_updated(move |volts| {
        seen.borrow_mut().push(*volts);
    });
    assert_eq!(r.scheduler.task_count(), 1);

    // Samples at 0, 250, 500 and 750 ms: 4.2, 3.8, 3.4, 3.0.
    r.scheduler.run_for(Duration::from_secs(1));
    assert_eq!(reads.get(), 4);
    assert_eq!(trace.borrow().len(), 4);
    assert_eq!(*alarms.borrow(), vec![3.0]);
    assert_eq!(battery.format(), "3 V");
    assert_eq!(battery.format_labeled(), "bat: 3 V");

    // Each 250 ms gap became a 150 ms excursion plus the sleep margin.
    assert!(!r.driver.entered().is_empty());
    assert!(
        r.driver
            .entered()
            .iter()
            .all(|gap| *gap == Duration::from_millis(150))
    );

    // The alarm removed itself; dropping the trace listener retires the
    // sampling task and the ADC goes quiet.
    assert!(battery.cell().remove(watching));
    assert_eq!(r.scheduler.task_count(), 0);
    r.scheduler.run_for(Duration::from_secs(1));
    assert_eq!(reads.get(), 4);
}

#[test]
fn smoothing_suppresses_spikes_but_passes_sustained_change() {
    let r = rig();
    let distance = ReactiveValue::new(&r.scheduler, 100.0);
    let smoothed = SmoothedValue::new(&distance, 4, SmoothingMode::Average);
    assert_eq!(distance.listener_count(), 1);

    let alerts = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&alerts);
    smoothed.cell().on_more_than(120.0, move |_| {
        counter.set(counter.get() + 1);
    });

    distance.set(104.0); // window [100, 104] -> 102
    assert_eq!(alerts.get(), 0);
    distance.set(160.0); // spike: [100, 104, 160] -> 121.33
    assert_eq!(alerts.get(), 1);
    distance.set(98.0); // [100, 104, 160, 98] -> 115.5
    distance.set(97.0); // [104, 160, 98, 97] -> 114.75
    assert_eq!(alerts.get(), 1);
    distance.set(160.0); // sustained: [160, 98, 97, 160] -> 128.75
    assert_eq!(alerts.get(), 2);
    assert_eq!(smoothed.get(), 128.75);

    drop(smoothed);
    assert_eq!(distance.listener_count(), 0);
}

#[test]
fn composite_readings_honor_per_element_thresholds() {
    let r = rig();
    let orientation = ReactiveValue::new(&r.scheduler, (0.0f64, 0.0f64));
    orientation.set_change_threshold(Some((5.0, 5.0)));

    let moves = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&moves);
    orientation.on_changed(move |pose| {
        seen.borrow_mut().push(*pose);
    });
    let updates = Rc::new(Cell::new(0u32));
    let every = Rc::clone(&updates);
    orientation.on_updated(move |_| {
        every.set(every.get() + 1);
    });

    orientation.set((3.0, 1.0)); // both deltas under 5
    orientation.set((6.0, 0.0)); // pitch moved 6: fires, baseline follows
    orientation.set((8.0, 2.0)); // deltas (2, 2) from the new baseline
    orientation.set((8.0, 9.0)); // roll moved 9 from baseline 0
    assert_eq!(*moves.borrow(), vec![(6.0, 0.0), (8.0, 9.0)]);
    assert_eq!(updates.get(), 4);
}

#[test]
fn dropping_every_handle_retires_the_refresh_task() {
    let r = rig();
    {
        let thermometer = ReactiveValue::with_refresh(
            &r.scheduler,
            20.0,
            Duration::from_millis(100),
            || Some(21.0),
        );
        thermometer.on_updated(|_| {});
        assert_eq!(r.scheduler.task_count(), 1);
    }
    assert_eq!(r.scheduler.task_count(), 0);
    // The loop stays healthy with nothing left to run.
    assert_eq!(r.scheduler.run_until_idle(), 0);
}
