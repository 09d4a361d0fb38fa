// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end allocation scenarios.

use approx::assert_relative_eq;
use hydronet_allocation::{
    allocate_customer_points, AllocationConfig, AllocationResult, AllocationRule, CancellationToken, CustomerPoint,
    CustomerPoints, Error,
};
use hydronet_network::{BufferKind, HydraulicModel, Position};

const J1: u32 = 1;
const J2: u32 = 2;
const P1: u32 = 3;
const CP1: u32 = 4;
const CP2: u32 = 5;

fn j1() -> Position {
    Position::new(-95.4089633, 29.701228)
}

fn j2() -> Position {
    Position::new(-95.4077939, 29.702706)
}

fn single_pipe(diameter: f64) -> HydraulicModel {
    HydraulicModel::builder()
        .a_junction(J1, j1())
        .a_junction(J2, j2())
        .a_pipe(P1, J1, J2, &[], diameter)
        .build()
        .unwrap()
}

fn points(list: &[(u32, f64, f64)]) -> CustomerPoints {
    list.iter()
        .map(|&(id, x, y)| (id, CustomerPoint::new(id, Position::new(x, y), 10.0 * id as f64)))
        .collect()
}

fn single_threaded() -> AllocationConfig {
    AllocationConfig::default()
        .with_workers(1)
        .with_bucket_size(30.0)
        .with_buffer_kind(BufferKind::Array)
}

fn pooled(workers: usize) -> AllocationConfig {
    AllocationConfig::default()
        .with_workers(workers)
        .with_bucket_size(30.0)
        .with_buffer_kind(BufferKind::Shared)
}

fn allocate(model: &HydraulicModel, rules: &[AllocationRule], points: &CustomerPoints) -> AllocationResult {
    allocate_customer_points(model, rules, points, &single_threaded(), &CancellationToken::new()).unwrap()
}

#[test]
fn point_near_pipe_connects_to_nearer_junction() {
    let model = single_pipe(12.0);
    let points = points(&[(CP1, -95.4084, 29.7019), (CP2, -95.4082, 29.7018)]);
    let result = allocate(&model, &[AllocationRule::new(200.0, 15.0)], &points);

    assert_eq!(result.allocated.len(), 2);
    assert!(result.disconnected.is_empty());
    assert_eq!(result.rule_matches, vec![2]);

    let connection = result.allocated[&CP1].connection().copied().unwrap();
    assert_eq!(connection.pipe_id, P1);
    assert_eq!(connection.junction_id, J1);
    // The snap point lies on the pipe, between its ends.
    assert!(connection.snap_point.x > j1().x && connection.snap_point.x < j2().x);
    let t = (connection.snap_point.x - j1().x) / (j2().x - j1().x);
    assert_relative_eq!(connection.snap_point.y, j1().y + t * (j2().y - j1().y), epsilon = 1e-9);
}

#[test]
fn pipe_above_max_diameter_is_ignored() {
    let model = single_pipe(12.0);
    let points = points(&[(CP1, -95.4084, 29.7019)]);
    let result = allocate(&model, &[AllocationRule::new(200.0, 10.0)], &points);

    assert!(result.allocated.is_empty());
    assert_eq!(result.disconnected.len(), 1);
    assert!(result.disconnected[&CP1].connection().is_none());
    assert_eq!(result.rule_matches, vec![0]);
}

#[test]
fn first_matching_rule_wins() {
    let model = single_pipe(8.0);
    let points = points(&[(CP1, -95.4084, 29.7019)]);
    let rules = [AllocationRule::new(200.0, 10.0), AllocationRule::new(200.0, 15.0)];
    let result = allocate(&model, &rules, &points);

    assert_eq!(result.allocated.len(), 1);
    assert_eq!(result.rule_matches, vec![1, 0]);
}

#[test]
fn later_rule_catches_what_earlier_rules_reject() {
    let model = single_pipe(12.0);
    let points = points(&[(CP1, -95.4084, 29.7019)]);
    let rules = [AllocationRule::new(200.0, 10.0), AllocationRule::new(200.0, 15.0)];
    let result = allocate(&model, &rules, &points);

    assert_eq!(result.rule_matches, vec![0, 1]);
}

#[test]
fn far_points_are_disconnected() {
    let model = single_pipe(12.0);
    let points = points(&[(CP1, -95.4084, 29.7019), (CP2, -95.4, 29.8)]);
    let result = allocate(&model, &[AllocationRule::new(200.0, 15.0)], &points);

    assert!(result.allocated.contains_key(&CP1));
    assert!(result.disconnected.contains_key(&CP2));
    assert_eq!(result.rule_matches, vec![1]);
}

#[test]
fn narrower_pipe_is_chosen_when_wider_is_excluded() {
    let model = HydraulicModel::builder()
        .a_junction(1, Position::new(-95.4089633, 29.701228))
        .a_junction(2, Position::new(-95.4077939, 29.702706))
        .a_junction(3, Position::new(-95.4089633, 29.710228))
        .a_junction(4, Position::new(-95.4077939, 29.711706))
        .a_pipe(5, 1, 2, &[], 8.0)
        .a_pipe(6, 3, 4, &[], 16.0)
        .build()
        .unwrap();
    let points = points(&[(7, -95.4084, 29.7019), (8, -95.4084, 29.7109)]);
    let result = allocate(&model, &[AllocationRule::new(200.0, 10.0)], &points);

    assert_eq!(result.allocated.len(), 1);
    assert_eq!(result.allocated[&7].connection().map(|c| c.pipe_id), Some(5));
    assert!(result.disconnected.contains_key(&8));
}

#[test]
fn closest_of_several_pipes_wins() {
    // Two parallel east-west pipes, the point is nearer the northern one.
    let model = HydraulicModel::builder()
        .a_junction(1, Position::new(-95.4100, 29.7000))
        .a_junction(2, Position::new(-95.4080, 29.7000))
        .a_junction(3, Position::new(-95.4100, 29.7003))
        .a_junction(4, Position::new(-95.4080, 29.7003))
        .a_pipe(10, 1, 2, &[], 8.0)
        .a_pipe(11, 3, 4, &[], 8.0)
        .build()
        .unwrap();
    let points = points(&[(20, -95.4095, 29.7002)]);
    let result = allocate(&model, &[AllocationRule::new(100.0, 10.0)], &points);

    let connection = result.allocated[&20].connection().copied().unwrap();
    assert_eq!(connection.pipe_id, 11);
    assert_eq!(connection.junction_id, 3);
}

#[test]
fn pipe_between_tanks_cannot_take_demand() {
    let model = HydraulicModel::builder()
        .a_tank(1, j1())
        .a_reservoir(2, j2())
        .a_pipe(P1, 1, 2, &[], 12.0)
        .build()
        .unwrap();
    let points = points(&[(CP1, -95.4084, 29.7019)]);
    let result = allocate(&model, &[AllocationRule::new(200.0, 15.0)], &points);

    assert!(result.allocated.is_empty());
    assert_eq!(result.rule_matches, vec![0]);
}

#[test]
fn network_without_pipes_disconnects_everything() {
    let model = HydraulicModel::builder()
        .a_junction(J1, j1())
        .a_junction(J2, j2())
        .a_valve(P1, J1, J2, 12.0)
        .build()
        .unwrap();
    let points = points(&[(CP1, -95.4084, 29.7019), (CP2, -95.4082, 29.7018)]);
    let result = allocate(&model, &[AllocationRule::default()], &points);

    assert!(result.allocated.is_empty());
    assert_eq!(result.disconnected.len(), 2);
    assert_eq!(result.rule_matches, vec![0]);
}

#[test]
fn no_customer_points_yields_empty_result() {
    let model = single_pipe(12.0);
    let rules = [AllocationRule::default(), AllocationRule::new(50.0, 20.0)];
    let result = allocate(&model, &rules, &CustomerPoints::new());

    assert!(result.allocated.is_empty());
    assert!(result.disconnected.is_empty());
    assert_eq!(result.rule_matches, vec![0, 0]);
}

#[test]
fn inputs_are_left_untouched() {
    let model = single_pipe(12.0);
    let points = points(&[(CP1, -95.4084, 29.7019), (CP2, -95.4, 29.8)]);
    let before = points.clone();
    let result = allocate(&model, &[AllocationRule::new(200.0, 15.0)], &points);

    assert_eq!(points, before);
    assert!(points[&CP1].connection().is_none());
    let allocated = &result.allocated[&CP1];
    assert_eq!(allocated.id(), CP1);
    assert_eq!(allocated.base_demand(), points[&CP1].base_demand());
    assert_eq!(allocated.coordinates(), points[&CP1].coordinates());
    assert_eq!(result.disconnected[&CP2], points[&CP2]);
}

/// A 10 x 10 street grid around Houston with points scattered across and
/// outside it.
fn grid_scenario() -> (HydraulicModel, CustomerPoints) {
    let origin = Position::new(-95.42, 29.70);
    let step = 0.001;
    let mut builder = HydraulicModel::builder();
    let node_id = |row: u32, col: u32| 1 + row * 10 + col;
    for row in 0..10 {
        for col in 0..10 {
            let position = Position::new(origin.x + col as f64 * step, origin.y + row as f64 * step);
            builder = if (row + col) % 7 == 0 {
                builder.a_tank(node_id(row, col), position)
            } else {
                builder.a_junction(node_id(row, col), position)
            };
        }
    }
    let mut pipe_id = 1000;
    for row in 0..10 {
        for col in 0..10 {
            let diameter = [6.0, 8.0, 12.0, 16.0][((row * 3 + col) % 4) as usize];
            if col < 9 {
                builder = builder.a_pipe(pipe_id, node_id(row, col), node_id(row, col + 1), &[], diameter);
                pipe_id += 1;
            }
            if row < 9 {
                let bend = Position::new(
                    origin.x + col as f64 * step + 0.0002,
                    origin.y + (row as f64 + 0.5) * step,
                );
                builder = builder.a_pipe(pipe_id, node_id(row, col), node_id(row + 1, col), &[bend], diameter);
                pipe_id += 1;
            }
        }
    }
    let model = builder.build().unwrap();

    let mut points = CustomerPoints::new();
    for i in 0..250u32 {
        let fx = ((i * 37) % 113) as f64 / 113.0;
        let fy = ((i * 61) % 127) as f64 / 127.0;
        let position = Position::new(origin.x - 0.002 + fx * 0.013, origin.y - 0.002 + fy * 0.013);
        points.insert(5000 + i, CustomerPoint::new(5000 + i, position, 1.0));
    }
    (model, points)
}

#[test]
fn worker_pool_matches_single_thread() {
    let (model, points) = grid_scenario();
    let rules = [
        AllocationRule::new(40.0, 8.0),
        AllocationRule::new(100.0, 12.0),
        AllocationRule::new(250.0, 20.0),
    ];
    let token = CancellationToken::new();

    let baseline = allocate_customer_points(&model, &rules, &points, &single_threaded(), &token).unwrap();
    assert_eq!(baseline.workers_used, 1);
    assert!(!baseline.used_shared_buffers);
    assert_eq!(baseline.allocated.len() + baseline.disconnected.len(), points.len());
    assert_eq!(baseline.rule_matches.iter().sum::<usize>(), baseline.allocated.len());
    assert!(!baseline.allocated.is_empty());

    for workers in [2, 3, 8] {
        let pooled = allocate_customer_points(&model, &rules, &points, &pooled(workers), &token).unwrap();
        assert!(pooled.used_shared_buffers);
        assert!(pooled.workers_used <= workers);
        assert_eq!(pooled.allocated, baseline.allocated);
        assert_eq!(pooled.disconnected, baseline.disconnected);
        assert_eq!(pooled.rule_matches, baseline.rule_matches);
    }
}

#[test]
fn cancelled_token_fails_the_call() {
    let (model, points) = grid_scenario();
    let token = CancellationToken::new();
    token.cancel();

    for config in [single_threaded(), pooled(4)] {
        let result = allocate_customer_points(&model, &[AllocationRule::default()], &points, &config, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

#[test]
fn cancelling_while_workers_run_discards_everything() {
    let (model, _) = grid_scenario();
    // Points far outside the grid walk every bucket of every rule.
    let points: CustomerPoints = (0..4_000u32)
        .map(|i| {
            let position = Position::new(-95.30 + f64::from(i % 100) * 1e-4, 29.80 + f64::from(i / 100) * 1e-4);
            (i + 1, CustomerPoint::new(i + 1, position, 1.0))
        })
        .collect();
    let rules = [AllocationRule::new(1500.0, 20.0), AllocationRule::new(3000.0, 20.0)];

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            token.cancel();
        })
    };
    let result = allocate_customer_points(&model, &rules, &points, &pooled(4), &token);
    canceller.join().unwrap();

    assert!(token.is_cancelled());
    assert!(matches!(result, Err(Error::Cancelled)));
}
