//! Benchmarks for write propagation through the reactive graph.
//!
//! Run with: cargo bench -p reactino-core

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reactino_core::reactive::{CellWriter, Computed, ReactiveError, Runtime};

/// A linear chain of `depth` computations, each adding one to the previous.
fn make_chain(runtime: &Runtime, depth: usize) -> (CellWriter<u64>, Computed<u64>) {
    let (source, set_source) = runtime.create_cell(0_u64);
    let mut last = runtime.create_computation(move || source.get());
    for _ in 0..depth {
        let previous = last.clone();
        last = runtime.create_computation(move || Ok::<_, ReactiveError>(previous.get()? + 1));
    }
    (set_source, last)
}

/// One source fanned out to `width` computations, joined by a single reader.
fn make_diamond(runtime: &Runtime, width: usize) -> (CellWriter<u64>, Computed<u64>) {
    let (source, set_source) = runtime.create_cell(0_u64);
    let branches: Vec<Computed<u64>> = (0..width as u64)
        .map(|offset| {
            let source = source.clone();
            runtime.create_computation(move || Ok::<_, ReactiveError>(source.get()? + offset))
        })
        .collect();
    let join = runtime.create_computation(move || {
        branches
            .iter()
            .try_fold(0_u64, |sum, branch| Ok::<_, ReactiveError>(sum + branch.get()?))
    });
    (set_source, join)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain");

    for depth in [10, 100, 1000] {
        let runtime = Runtime::new();
        let (set_source, tail) = make_chain(&runtime, depth);
        let _observer = runtime.create_effect(move || {
            black_box(tail.get()?);
            Ok(None)
        });

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("write_settle", depth), &depth, |b, _| {
            b.iter(|| {
                next += 1;
                set_source.set(next).ok();
                black_box(runtime.settle().ok())
            })
        });
        runtime.shutdown();
    }

    group.finish();
}

fn bench_chain_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain_pull");

    for depth in [10, 100, 1000] {
        let runtime = Runtime::new();
        let (set_source, tail) = make_chain(&runtime, depth);

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("write_peek", depth), &depth, |b, _| {
            b.iter(|| {
                next += 1;
                set_source.set(next).ok();
                black_box(tail.peek().ok())
            })
        });
        runtime.shutdown();
    }

    group.finish();
}

fn bench_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/diamond");

    for width in [4, 32, 256] {
        let runtime = Runtime::new();
        let (set_source, join) = make_diamond(&runtime, width);
        let _observer = runtime.create_effect(move || {
            black_box(join.get()?);
            Ok(None)
        });

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("write_settle", width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                set_source.set(next).ok();
                black_box(runtime.settle().ok())
            })
        });
        runtime.shutdown();
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_chain_pull, bench_diamond);
criterion_main!(benches);
