//! Benchmarks for task dispatch and idle selection.
//!
//! Run with: cargo bench -p bbot-core

use bbot_core::{
    Clock, IdleChoice, LogRouter, ManualClock, ManualLowPower, PowerPolicy, Scheduler, choose_idle,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;
use web_time::Duration;

fn scheduler_on(manual: &ManualClock) -> Scheduler {
    let router = LogRouter::new();
    let power = PowerPolicy::new(ManualLowPower::new(manual), &router);
    Scheduler::new(Clock::manual(manual), power, &router)
}

/// Register `n` immediately-due counting tasks.
fn seed_tasks(scheduler: &Scheduler, n: usize) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    for _ in 0..n {
        let count = Rc::clone(&count);
        scheduler.plan(move || {
            count.set(count.get() + 1);
            Ok(())
        });
    }
    count
}

fn bench_dispatch_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/dispatch_round");

    for n in [1, 10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("plan_then_drain", n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let manual = ManualClock::new();
                    let scheduler = scheduler_on(&manual);
                    seed_tasks(&scheduler, n);
                    scheduler
                },
                |scheduler| black_box(scheduler.run_until_idle()),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_repeating_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/repeating_tick");

    for n in [1, 10, 100] {
        let manual = ManualClock::new();
        let scheduler = scheduler_on(&manual);
        for _ in 0..n {
            scheduler
                .repeat(Duration::from_millis(1), || Ok(()))
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::new("advance_and_drain", n), &n, |b, _| {
            b.iter(|| {
                manual.advance(Duration::from_millis(1));
                black_box(scheduler.run_until_idle())
            })
        });
    }

    group.finish();
}

fn bench_idle_choice(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/idle_choice");
    let threshold = Duration::from_millis(100);

    group.bench_function("sleep_path", |b| {
        b.iter(|| {
            black_box(choose_idle(
                black_box(Some(Duration::from_millis(40))),
                true,
                threshold,
            ))
        })
    });
    group.bench_function("low_power_path", |b| {
        b.iter(|| {
            let choice = choose_idle(black_box(Some(Duration::from_millis(400))), true, threshold);
            debug_assert!(matches!(choice, IdleChoice::LowPower(_)));
            black_box(choice)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch_round,
    bench_repeating_tick,
    bench_idle_choice
);
criterion_main!(benches);
