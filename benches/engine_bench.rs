//! Benchmarks for jobherd
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jobherd::engine::{WorkBatch, WorkQueue};
use jobherd::item::WorkItem;
use jobherd::protocol::Request;

fn benchmark_queue_operations(c: &mut Criterion) {
    c.bench_function("queue_append_take", |b| {
        let mut queue = WorkQueue::new();

        b.iter(|| {
            for i in 0..64u64 {
                queue.append(i);
            }
            let taken = queue.take(64);
            black_box(taken);
        })
    });
}

fn benchmark_batch_partitioning(c: &mut Criterion) {
    let now = Utc::now();
    let items: Vec<WorkItem> = (0..10_000)
        .map(|i| WorkItem::new(format!("item{}", i), i, now))
        .collect();

    c.bench_function("batch_partition_requeue", |b| {
        b.iter(|| {
            let mut batch = WorkBatch::new(items.clone());
            while !batch.is_empty() {
                let mut partition = batch.take_partition(16);
                if let Some(failed) = partition.pop() {
                    if failed.bar % 7 != 0 {
                        black_box(&partition);
                    } else {
                        batch.requeue(WorkItem::new(failed.foo, failed.bar + 1, failed.baz));
                    }
                }
            }
        })
    });
}

fn benchmark_protocol_lines(c: &mut Criterion) {
    let now = Utc::now();
    let partition: Vec<WorkItem> = (0..32)
        .map(|i| WorkItem::new(format!("item{}", i), i, now))
        .collect();
    let request = Request::ProcessCollectionPart(partition);

    c.bench_function("partition_to_line", |b| {
        b.iter(|| black_box(request.to_line().unwrap()))
    });

    let line = request.to_line().unwrap();
    c.bench_function("partition_from_line", |b| {
        b.iter(|| black_box(Request::from_line(&line).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_queue_operations,
    benchmark_batch_partitioning,
    benchmark_protocol_lines
);
criterion_main!(benches);
