use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use segseq::{
    MemoryStore, MultiStoreAllocator, RangeAllocator, Sequence, SequenceConfig,
    SequenceRange, SingleStoreAllocator, Take, WeightedSelector,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of IDs taken per benchmark iteration (split across threads for the
// contended benchmarks).
const TOTAL_IDS: usize = 4096;

fn sequence<A>(allocator: A, step: i64) -> Sequence<A>
where
    A: RangeAllocator,
{
    let sequence = Sequence::new(
        SequenceConfig::new("bench").with_step(step),
        Arc::new(allocator),
    );
    sequence.init().unwrap();
    sequence
}

/// Benchmarks one thread draining a sequence; `step` sets how often the slow
/// path runs.
fn bench_sequence<A>(c: &mut Criterion, group_name: &str, allocator_fn: impl Fn() -> A)
where
    A: RangeAllocator,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    for step in [16, 256, 4096] {
        group.bench_function(format!("elems/{}/step/{}", TOTAL_IDS, step), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();

                for _ in 0..iters {
                    let sequence = sequence(allocator_fn(), step);
                    for _ in 0..TOTAL_IDS {
                        black_box(sequence.next_value().unwrap());
                    }
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmarks one sequence shared across threads, so refills contend on the
/// sequence's lock.
fn bench_sequence_contended<A>(c: &mut Criterion, group_name: &str, allocator_fn: impl Fn() -> A)
where
    A: RangeAllocator,
{
    let mut group = c.benchmark_group(group_name);
    let mut thread_counts = vec![1, 2, 4, 8, 16];
    let cpus = num_cpus::get();
    if !thread_counts.contains(&cpus) {
        thread_counts.push(cpus);
    }

    for thread_count in thread_counts {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_IDS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let sequence = sequence(allocator_fn(), 256);
                        let barrier = Barrier::new(thread_count + 1);
                        scope(|s| {
                            for _ in 0..thread_count {
                                let sequence = &sequence;
                                let barrier = &barrier;
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ids_per_thread {
                                        black_box(sequence.next_value().unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Baseline: the bare atomic cursor without any sequence around it.
fn benchmark_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range/take_next");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));
    group.bench_function(format!("elems/{}", TOTAL_IDS), |b| {
        b.iter(|| {
            let range = SequenceRange::new(0, TOTAL_IDS as i64);
            while let Take::Value(id) = range.take_next() {
                black_box(id);
            }
        });
    });
    group.finish();
}

fn benchmark_selector(c: &mut Criterion) {
    let selector = WeightedSelector::with_weights(vec![10, 20, 30, 40]).unwrap();
    let mut group = c.benchmark_group("selector/pick");
    group.bench_function("no_exclusions", |b| {
        b.iter(|| black_box(selector.pick(&[])));
    });
    group.bench_function("two_excluded", |b| {
        b.iter(|| black_box(selector.pick(black_box(&[0usize, 2][..]))));
    });
    group.finish();
}

fn benchmark_sequential_single(c: &mut Criterion) {
    bench_sequence(c, "sequential/single", || {
        SingleStoreAllocator::new(MemoryStore::new())
    });
}

fn benchmark_sequential_multi(c: &mut Criterion) {
    bench_sequence(c, "sequential/multi", || {
        MultiStoreAllocator::new(vec![MemoryStore::new(), MemoryStore::new(), MemoryStore::new()])
            .unwrap()
    });
}

fn benchmark_contended_single(c: &mut Criterion) {
    bench_sequence_contended(c, "contended/single", || {
        SingleStoreAllocator::new(MemoryStore::new())
    });
}

fn benchmark_contended_multi(c: &mut Criterion) {
    bench_sequence_contended(c, "contended/multi", || {
        MultiStoreAllocator::new(vec![MemoryStore::new(), MemoryStore::new(), MemoryStore::new()])
            .unwrap()
    });
}

criterion_group!(
    benches,
    benchmark_range,
    benchmark_selector,
    benchmark_sequential_single,
    benchmark_sequential_multi,
    benchmark_contended_single,
    benchmark_contended_multi,
);
criterion_main!(benches);
