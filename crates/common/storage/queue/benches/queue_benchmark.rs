// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the journaled queue.
//!
//! Measures:
//! - Enqueue latency per durability mode
//! - Enqueue then take throughput
//! - Recovery (replay + compaction) time

use std::hint::black_box;

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use redqueue_common_storage_queue::{DurabilityMode, QueueFactory, QueueFactoryBuilder, SessionId};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes)
const PAYLOAD_SIZES: &[usize] = &[64, 1024, 16384];

/// Number of entries for throughput tests
const BATCH_SIZE: usize = 5_000;

/// Rotation is pushed out of the way so it does not skew the numbers.
fn create_factory(temp_dir: &TempDir, durability: DurabilityMode) -> QueueFactory {
    QueueFactoryBuilder::new(temp_dir.path())
        .durability(durability)
        .rotate_threshold(u64::MAX)
        .size_warning_threshold(usize::MAX)
        .build()
        .expect("Failed to create factory")
}

fn generate_payload(size: usize) -> Bytes { Bytes::from(vec![0xABu8; size]) }

fn bench_enqueue_latency(c: &mut Criterion) {
    for (name, mode) in [
        ("enqueue_latency_none", DurabilityMode::None),
        ("enqueue_latency_buffered", DurabilityMode::Buffered),
    ] {
        let mut group = c.benchmark_group(name);
        for &size in PAYLOAD_SIZES {
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
                let temp_dir = TempDir::new().unwrap();
                let mut factory = create_factory(&temp_dir, mode);
                let queue = factory.queue("bench").unwrap();
                let payload = generate_payload(size);

                b.iter(|| {
                    queue.enqueue(None, black_box(payload.clone())).unwrap();
                });
            });
        }
        group.finish();
    }
}

/// fsync per record, only small payloads.
fn bench_enqueue_latency_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_latency_sync");
    group.sample_size(20);

    let size = 256;
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function(BenchmarkId::from_parameter(size), |b| {
        let temp_dir = TempDir::new().unwrap();
        let mut factory = create_factory(&temp_dir, DurabilityMode::Sync);
        let queue = factory.queue("bench").unwrap();
        let payload = generate_payload(size);

        b.iter(|| {
            queue.enqueue(None, black_box(payload.clone())).unwrap();
        });
    });

    group.finish();
}

fn bench_enqueue_take_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_take_throughput");
    group.sample_size(20);

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let factory = create_factory(&temp_dir, DurabilityMode::Buffered);
                    (temp_dir, factory, generate_payload(size))
                },
                |(temp_dir, mut factory, payload)| {
                    let session = SessionId::generate();
                    let queue = factory.queue("bench").unwrap();
                    for _ in 0..BATCH_SIZE {
                        queue.enqueue(None, payload.clone()).unwrap();
                    }
                    while let Some(entry) = queue.take(&session).unwrap() {
                        black_box(entry);
                    }
                    drop(factory);
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(10);

    for &count in &[1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let mut factory = create_factory(&temp_dir, DurabilityMode::Buffered);
                    let session = SessionId::generate();
                    let queue = factory.queue("bench").unwrap();
                    let payload = generate_payload(256);
                    for _ in 0..count {
                        queue.enqueue(None, payload.clone()).unwrap();
                    }
                    // Half of the journal is consumed history.
                    for _ in 0..count / 2 {
                        queue.take(&session).unwrap();
                    }
                    drop(factory);
                    temp_dir
                },
                |temp_dir| {
                    let mut factory = create_factory(&temp_dir, DurabilityMode::Buffered);
                    black_box(factory.recover().unwrap());
                    drop(factory);
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_latency,
    bench_enqueue_latency_sync,
    bench_enqueue_take_throughput,
    bench_recovery,
);
criterion_main!(benches);
