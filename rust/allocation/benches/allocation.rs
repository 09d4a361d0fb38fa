// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Benchmark of the allocation pipeline on a synthetic street grid.
//!
//! Compares the single-threaded path against the shared-buffer worker pool.
//!
//! Run with: cargo bench -p hydronet-allocation --bench allocation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hydronet_allocation::{
    allocate_customer_points, AllocationConfig, AllocationRule, CancellationToken, CustomerPoint, CustomerPoints,
    RunData,
};
use hydronet_network::{BufferKind, HydraulicModel, Position};

const ORIGIN: (f64, f64) = (-95.45, 29.68);
const STEP: f64 = 0.001;

/// `size` x `size` junctions joined by pipes along rows and columns.
fn grid_model(size: u32) -> HydraulicModel {
    let mut builder = HydraulicModel::builder();
    let node_id = |row: u32, col: u32| 1 + row * size + col;
    for row in 0..size {
        for col in 0..size {
            builder = builder.a_junction(
                node_id(row, col),
                Position::new(ORIGIN.0 + col as f64 * STEP, ORIGIN.1 + row as f64 * STEP),
            );
        }
    }
    let mut pipe_id = size * size + 1;
    for row in 0..size {
        for col in 0..size {
            let diameter = if (row + col) % 3 == 0 { 16.0 } else { 8.0 };
            if col + 1 < size {
                builder = builder.a_pipe(pipe_id, node_id(row, col), node_id(row, col + 1), &[], diameter);
                pipe_id += 1;
            }
            if row + 1 < size {
                builder = builder.a_pipe(pipe_id, node_id(row, col), node_id(row + 1, col), &[], diameter);
                pipe_id += 1;
            }
        }
    }
    builder.build().expect("grid model")
}

/// Points spread deterministically over the grid extent.
fn scattered_points(count: u32, size: u32) -> CustomerPoints {
    let extent = size as f64 * STEP;
    (0..count)
        .map(|i| {
            let fx = ((i as u64 * 7919) % 10007) as f64 / 10007.0;
            let fy = ((i as u64 * 6151) % 10009) as f64 / 10009.0;
            let id = 1_000_000 + i;
            let position = Position::new(ORIGIN.0 + fx * extent, ORIGIN.1 + fy * extent);
            (id, CustomerPoint::new(id, position, 1.0))
        })
        .collect()
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    let model = grid_model(60);
    let points = scattered_points(10_000, 60);

    for kind in [BufferKind::Array, BufferKind::Shared] {
        group.bench_with_input(BenchmarkId::new("run_data", kind.as_str()), &kind, |b, &kind| {
            b.iter(|| RunData::prepare(black_box(&model), points.values(), kind).expect("run data"))
        });
    }
    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    group.sample_size(10);

    let model = grid_model(60);
    let rules = [AllocationRule::new(60.0, 10.0), AllocationRule::new(150.0, 20.0)];
    let token = CancellationToken::new();

    for count in [1_000u32, 10_000] {
        let points = scattered_points(count, 60);
        group.throughput(Throughput::Elements(count as u64));

        let configs = [
            ("single", AllocationConfig::default().with_workers(1).with_buffer_kind(BufferKind::Array)),
            ("pool", AllocationConfig::default().with_buffer_kind(BufferKind::Shared)),
        ];
        for (name, config) in configs {
            group.bench_with_input(BenchmarkId::new(name, count), &points, |b, points| {
                b.iter(|| {
                    allocate_customer_points(black_box(&model), &rules, points, &config, &token).expect("allocation")
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_prepare, bench_allocate);
criterion_main!(benches);
