//! Benchmarks for cascade-core
//!
//! Run with: cargo bench

use std::time::Duration;

use cascade_core::reactive::{Computed, ComputedOptions, ManualTimer, Observable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// =============================================================================
// OBSERVABLE BENCHMARKS
// =============================================================================

fn bench_observable_set(c: &mut Criterion) {
    let o = Observable::new(0i32);
    let mut i = 0i32;
    c.bench_function("observable_set", |b| {
        b.iter(|| {
            o.set(black_box(i));
            i += 1;
        })
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_create(c: &mut Criterion) {
    let o = Observable::new(0i32);
    c.bench_function("computed_create", |b| {
        b.iter(|| {
            black_box(Computed::new({
                let o = o.clone();
                move || o.get() * 2
            }))
        })
    });
}

fn bench_computed_get_cached(c: &mut Criterion) {
    let o = Observable::new(42i32);
    let d = Computed::new({
        let o = o.clone();
        move || o.get() * 2
    });

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(d.get())));
}

fn bench_computed_reevaluate(c: &mut Criterion) {
    let o = Observable::new(0i32);
    let d = Computed::new({
        let o = o.clone();
        move || o.get() * 2
    });

    let mut i = 0i32;
    c.bench_function("computed_reevaluate", |b| {
        b.iter(|| {
            o.set(i);
            i += 1;
            black_box(d.get())
        })
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let o = Observable::new(0i32);

            let mut current = {
                let o = o.clone();
                Computed::new(move || o.get() + 1)
            };
            for _ in 1..depth {
                let prev = current.clone();
                current = Computed::new(move || prev.get() + 1);
            }

            let mut i = 0i32;
            b.iter(|| {
                o.set(i);
                i += 1;
                black_box(current.get())
            })
        });
    }

    group.finish();
}

// =============================================================================
// RECONCILIATION BENCHMARKS
// =============================================================================

fn bench_branch_switch(c: &mut Criterion) {
    let mut group = c.benchmark_group("branch_switch");

    for width in [4, 32, 256] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            let toggle = Observable::new(false);
            let left: Vec<_> = (0..width).map(Observable::new).collect();
            let right: Vec<_> = (0..width).map(Observable::new).collect();

            let sum = Computed::new({
                let (toggle, left, right) = (toggle.clone(), left.clone(), right.clone());
                move || {
                    let side = if toggle.get() { &left } else { &right };
                    side.iter().map(Observable::get).sum::<i32>()
                }
            });

            b.iter(|| {
                toggle.update(|t| !t);
                black_box(sum.get())
            })
        });
    }

    group.finish();
}

fn bench_stable_fan_in(c: &mut Criterion) {
    let sources: Vec<_> = (0..100).map(Observable::new).collect();
    let sum = Computed::new({
        let sources = sources.clone();
        move || sources.iter().map(Observable::get).sum::<i32>()
    });

    let mut i = 0i32;
    c.bench_function("stable_fan_in_100", |b| {
        b.iter(|| {
            sources[0].set(i);
            i += 1;
            black_box(sum.get())
        })
    });
}

// =============================================================================
// THROTTLE BENCHMARKS
// =============================================================================

fn bench_throttle_burst(c: &mut Criterion) {
    let timer = ManualTimer::new();
    let o = Observable::new(0i32);
    let d = Computed::with_options(
        ComputedOptions::new()
            .throttle_evaluation(Duration::from_millis(10))
            .timer(timer.clone())
            .read({
                let o = o.clone();
                move || o.get()
            }),
    )
    .expect("read function is configured");

    let mut i = 0i32;
    c.bench_function("throttle_burst_10", |b| {
        b.iter(|| {
            for _ in 0..10 {
                o.set(i);
                i += 1;
            }
            timer.advance(Duration::from_millis(10));
            black_box(d.peek())
        })
    });
}

criterion_group!(
    benches,
    bench_observable_set,
    bench_computed_create,
    bench_computed_get_cached,
    bench_computed_reevaluate,
    bench_computed_chain,
    bench_branch_switch,
    bench_stable_fan_in,
    bench_throttle_burst,
);
criterion_main!(benches);
