//! E2E scenarios for the task loop on a manual clock.
//!
//! Validates:
//! 1. A mixed table of one-shot, postponed and repeating tasks dispatches
//!    in deadline order with FIFO ties, with exact timestamps.
//! 2. A slow action stretches its repeat interval instead of causing
//!    catch-up bursts.
//! 3. Idle gaps become low-power excursions only when the plan permits
//!    and no block is held.
//! 4. Task failures surface as transport-chunked exception reports and
//!    leave the loop healthy.

#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bbot_core::{
    CONTINUATION_MARK, Clock, Level, LogRouter, ManualClock, ManualLowPower, MemorySink,
    PowerPlan, PowerPolicy, Scheduler, TaskError,
};
use web_time::Duration;

// ── Fixture ─────────────────────────────────────────────────────────────

struct Rig {
    scheduler: Scheduler,
    manual: ManualClock,
    driver: ManualLowPower,
    sink: MemorySink,
}

fn rig() -> Rig {
    let manual = ManualClock::new();
    let driver = ManualLowPower::new(&manual);
    let router = LogRouter::new();
    let sink = MemorySink::new();
    router.add_sink(sink.clone());
    let power = PowerPolicy::new(driver.clone(), &router);
    let scheduler = Scheduler::new(Clock::manual(&manual), power, &router);
    Rig {
        scheduler,
        manual,
        driver,
        sink,
    }
}

type Trace = Rc<RefCell<Vec<(&'static str, u128)>>>;

fn tracer(trace: &Trace, manual: &ManualClock, name: &'static str) -> impl FnMut() -> bbot_core::TaskResult + use<> {
    let trace = Rc::clone(trace);
    let manual = manual.clone();
    let start = manual.now();
    move || {
        let elapsed = (manual.now() - start).as_millis();
        trace.borrow_mut().push((name, elapsed));
        Ok(())
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn mixed_workload_dispatches_on_exact_deadlines() {
    let r = rig();
    let trace: Trace = Rc::default();

    r.scheduler
        .repeat(
            Duration::from_millis(100),
            tracer(&trace, &r.manual, "heartbeat"),
        )
        .unwrap();
    r.scheduler.plan(tracer(&trace, &r.manual, "banner"));
    r.scheduler.postpone(
        Duration::from_millis(250),
        tracer(&trace, &r.manual, "sensor"),
    );

    r.scheduler.run_for(Duration::from_secs(1));

    let expected: Vec<(&str, u128)> = vec![
        ("heartbeat", 0),
        ("banner", 0),
        ("heartbeat", 100),
        ("heartbeat", 200),
        ("sensor", 250),
        ("heartbeat", 300),
        ("heartbeat", 400),
        ("heartbeat", 500),
        ("heartbeat", 600),
        ("heartbeat", 700),
        ("heartbeat", 800),
        ("heartbeat", 900),
    ];
    assert_eq!(*trace.borrow(), expected);
    // Every gap was at or under the light-sleep threshold.
    assert!(r.driver.entered().is_empty());
}

#[test]
fn slow_action_stretches_the_repeat_interval() {
    let r = rig();
    let trace: Trace = Rc::default();
    let starts = Rc::clone(&trace);
    let manual = r.manual.clone();
    let epoch = manual.now();

    r.scheduler
        .repeat(Duration::from_millis(100), move || {
            starts
                .borrow_mut()
                .push(("tick", (manual.now() - epoch).as_millis()));
            // Simulate 40 ms of sensor work.
            manual.advance(Duration::from_millis(40));
            Ok(())
        })
        .unwrap();

    r.scheduler.run_for(Duration::from_millis(500));

    // Period counts from completion: starts drift by work time.
    let times: Vec<u128> = trace.borrow().iter().map(|(_, t)| *t).collect();
    assert_eq!(times, vec![0, 140, 280, 420]);
}

#[test]
fn low_power_gating_follows_plan_and_blocks() {
    let r = rig();
    let drain = |r: &Rig| {
        // Consume whatever came due so every phase starts on a clean gap.
        r.manual.advance(Duration::from_millis(100));
        r.scheduler.run_until_idle();
    };

    // Balanced plan, wide gap: excursion wakes one threshold early.
    r.scheduler.postpone(Duration::from_secs(2), || Ok(()));
    r.scheduler.tick();
    assert_eq!(r.driver.entered(), vec![Duration::from_millis(1900)]);
    drain(&r);

    // Max performance forbids the excursion outright.
    r.scheduler.power().set_plan(PowerPlan::max_performance());
    r.scheduler.postpone(Duration::from_secs(2), || Ok(()));
    r.scheduler.tick();
    assert_eq!(r.driver.entered().len(), 1);
    drain(&r);

    // Balanced again, but a held block wins.
    r.scheduler.power().set_plan(PowerPlan::balanced());
    r.scheduler.power().block();
    r.scheduler.postpone(Duration::from_secs(2), || Ok(()));
    r.scheduler.tick();
    assert_eq!(r.driver.entered().len(), 1);
    drain(&r);

    r.scheduler.power().unblock();
    r.scheduler.postpone(Duration::from_secs(2), || Ok(()));
    r.scheduler.tick();
    assert_eq!(r.driver.entered().len(), 2);
}

#[test]
fn deep_failure_is_chunked_and_the_loop_survives() {
    let r = rig();
    r.scheduler.plan(|| {
        Err(TaskError::with_source(
            "drive controller fault ".repeat(8),
            TaskError::with_source(
                "i2c transaction aborted ".repeat(8),
                TaskError::new("bus arbitration lost ".repeat(8)),
            ),
        ))
    });
    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    r.scheduler.plan(move || {
        flag.set(true);
        Ok(())
    });

    assert_eq!(r.scheduler.run_until_idle(), 2);
    assert!(ran.get());

    let errors: Vec<String> = r
        .sink
        .records()
        .into_iter()
        .filter(|(level, _)| *level == Level::Error)
        .map(|(_, line)| line)
        .collect();
    assert!(errors.len() >= 2, "expected a chunked report, got {errors:?}");
    assert!(errors[0].starts_with("planner: Unhandled exception\n"));
    for (index, chunk) in errors.iter().enumerate() {
        let is_last = index == errors.len() - 1;
        assert_eq!(chunk.ends_with(CONTINUATION_MARK), !is_last);
    }
    let report: String = errors.concat();
    assert!(report.contains("drive controller fault"));
    assert!(report.contains("caused by: i2c transaction aborted"));
    assert!(report.contains("caused by: bus arbitration lost"));
}

#[test]
fn killing_one_repeater_leaves_the_rest_running() {
    let r = rig();
    let first_runs = Rc::new(Cell::new(0u32));
    let second_runs = Rc::new(Cell::new(0u32));

    let first_seen = Rc::clone(&first_runs);
    let first = r
        .scheduler
        .repeat(Duration::from_millis(50), move || {
            first_seen.set(first_seen.get() + 1);
            Ok(())
        })
        .unwrap();
    let second_seen = Rc::clone(&second_runs);
    r.scheduler
        .repeat(Duration::from_millis(50), move || {
            second_seen.set(second_seen.get() + 1);
            Ok(())
        })
        .unwrap();

    // Runs at 0, 50 and 100 ms for both.
    r.scheduler.run_for(Duration::from_millis(120));
    assert_eq!(first_runs.get(), 3);
    assert_eq!(second_runs.get(), 3);

    assert!(r.scheduler.kill(first));
    r.scheduler.run_for(Duration::from_millis(200));

    assert_eq!(first_runs.get(), 3);
    assert_eq!(second_runs.get(), 7);
    assert_eq!(r.scheduler.task_count(), 1);
}
