use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use orrery::prelude::TaskQueue;

#[derive(Default)]
struct Counter {
    total: u64,
}

fn benchmark_enqueue_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_and_drain");

    for batch in [1usize, 16, 256].iter() {
        let queue = TaskQueue::<Counter>::new();
        let mut counter = Counter::default();

        group.bench_with_input(
            BenchmarkId::new("batch", batch),
            batch,
            |b, &batch| {
                b.iter(|| {
                    for i in 0..batch as u64 {
                        queue.enqueue(move |counter: &mut Counter| {
                            counter.total += i;
                        });
                    }
                    black_box(queue.drain_and_run_all(&mut counter));
                    black_box(counter.total)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_empty_drain(c: &mut Criterion) {
    let queue = TaskQueue::<Counter>::new();
    let mut counter = Counter::default();

    c.bench_function("drain_empty", |b| {
        b.iter(|| black_box(queue.drain_and_run_all(&mut counter)));
    });
}

criterion_group!(benches, benchmark_enqueue_and_drain, benchmark_empty_drain);
criterion_main!(benches);
