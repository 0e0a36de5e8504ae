//! Commit and lookup throughput for in-memory containers.
//!
//! Run with: `cargo bench -p hamt-container --bench commit`

use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use hamt_container::{Container, ContainerBuilder};

fn populated(entries: usize) -> Container {
    let c = ContainerBuilder::new().identity("bench").build().unwrap();
    for i in 0..entries {
        c.stage(format!("key-{i:06}"), format!("value-{i}")).unwrap();
    }
    c.commit().unwrap();
    c
}

/// Full rebuild cost of a commit as the container grows.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("fresh", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let c = ContainerBuilder::new().identity("bench").build().unwrap();
                    for i in 0..size {
                        c.stage(format!("key-{i:06}"), format!("value-{i}")).unwrap();
                    }
                    c
                },
                |c| c.commit().unwrap(),
                BatchSize::LargeInput,
            )
        });
        group.bench_with_input(BenchmarkId::new("one_more", size), &size, |b, &size| {
            let c = populated(size);
            let counter = AtomicU64::new(0);
            b.iter(|| {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                c.stage(format!("extra-{n}"), "x").unwrap();
                c.commit().unwrap()
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let container = populated(10_000);
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    let counter = AtomicU64::new(0);
    group.bench_function("get_as_text", |b| {
        b.iter(|| {
            let idx = counter.fetch_add(1, Ordering::Relaxed) % 10_000;
            container.get_as_text(format!("key-{idx:06}")).unwrap()
        })
    });
    group.bench_function("view_all", |b| {
        b.iter(|| {
            let mut n = 0usize;
            container
                .view(|_, _| {
                    n += 1;
                    Ok(())
                })
                .unwrap();
            n
        })
    });
    group.finish();
}

criterion_group!(benches, bench_commit, bench_lookup);
criterion_main!(benches);
