// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Allocation orchestrator: encodes the run data once, fans the customer
//! points out to a fixed worker pool in static contiguous slices and folds
//! the slice results back in input order.

use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;

use hydronet_network::{BufferKind, HydraulicModel};

use crate::cancel::CancellationToken;
use crate::config::AllocationConfig;
use crate::customer_points::{AllocationRule, CustomerPointId, CustomerPoints};
use crate::error::{Error, Result};
use crate::prepare::RunData;
use crate::run::{run_allocation, AllocationResultItem};

/// Outcome of an allocation call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationResult {
    /// Connected copies of the input points.
    pub allocated: CustomerPoints,
    /// Disconnected copies of the points no rule could place.
    pub disconnected: CustomerPoints,
    /// Number of points matched by each rule, one slot per input rule.
    pub rule_matches: Vec<usize>,
    /// Worker slices that ran (1 on the single-threaded path).
    pub workers_used: usize,
    /// Whether the shared-buffer worker pool ran.
    pub used_shared_buffers: bool,
}

/// Connects every customer point to its nearest eligible pipe.
///
/// Rules are tried in order and the first one that yields a connection wins.
/// The input points are never modified: results hold independent copies.
/// With [`BufferKind::Shared`] and more than one worker the points are split
/// across a thread pool; otherwise they run on the calling thread. Both paths
/// produce identical results.
pub fn allocate_customer_points(
    model: &HydraulicModel,
    rules: &[AllocationRule],
    customer_points: &CustomerPoints,
    config: &AllocationConfig,
    cancel: &CancellationToken,
) -> Result<AllocationResult> {
    let started = Instant::now();
    let mut result = AllocationResult {
        rule_matches: vec![0; rules.len()],
        ..AllocationResult::default()
    };
    if customer_points.is_empty() {
        return Ok(result);
    }
    if cancel.is_cancelled() {
        tracing::warn!("allocation cancelled before start");
        return Err(Error::Cancelled);
    }

    let data = RunData::prepare(model, customer_points.values(), config.buffer_kind)?;
    let total = data.customer_point_count();

    let use_workers = config.buffer_kind == BufferKind::Shared && config.workers > 1;
    let items = if use_workers {
        let slices = static_slices(total, config.workers);
        result.workers_used = slices.len();
        result.used_shared_buffers = true;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("hydronet-allocation-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        run_slices(&pool, &slices, |range| {
            run_allocation(&data, rules, config.bucket_size_m, range, cancel)
        })
    } else {
        result.workers_used = 1;
        run_allocation(&data, rules, config.bucket_size_m, 0..total, cancel)
    };

    for item in settle(items, cancel, total)? {
        apply(&mut result, customer_points, item);
    }

    tracing::info!(
        customer_points = total,
        rules = rules.len(),
        workers = result.workers_used,
        shared = result.used_shared_buffers,
        allocated = result.allocated.len(),
        disconnected = result.disconnected.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "customer points allocated"
    );
    Ok(result)
}

fn apply(result: &mut AllocationResult, customer_points: &CustomerPoints, item: AllocationResultItem) {
    let id: CustomerPointId = item.customer_point_id;
    let Some(source) = customer_points.get(&id) else {
        return;
    };
    let mut copy = source.copy_disconnected();
    match (item.rule_index, item.connection) {
        (Some(rule_index), Some(connection)) => {
            copy.connect(connection);
            result.allocated.insert(id, copy);
            if let Some(count) = result.rule_matches.get_mut(rule_index) {
                *count += 1;
            }
        }
        _ => {
            result.disconnected.insert(id, copy);
        }
    }
}

/// Keeps joined results only if nobody cancelled the call meanwhile.
fn settle(
    items: Result<Vec<AllocationResultItem>>,
    cancel: &CancellationToken,
    total: usize,
) -> Result<Vec<AllocationResultItem>> {
    match items {
        Ok(items) if !cancel.is_cancelled() => Ok(items),
        Ok(_) | Err(Error::Cancelled) => {
            tracing::warn!(customer_points = total, "allocation cancelled");
            Err(Error::Cancelled)
        }
        Err(e) => Err(e),
    }
}

/// Splits `0..total` into at most `workers` contiguous slices of
/// `ceil(total / workers)` points; empty trailing slices are dropped.
fn static_slices(total: usize, workers: usize) -> Vec<Range<usize>> {
    let per_worker = total.div_ceil(workers.max(1)).max(1);
    (0..total)
        .step_by(per_worker)
        .map(|start| start..(start + per_worker).min(total))
        .collect()
}

/// Runs `work` once per slice on `pool` and concatenates the results in
/// slice order. A panicking slice fails the whole run.
fn run_slices<F>(
    pool: &rayon::ThreadPool,
    slices: &[Range<usize>],
    work: F,
) -> Result<Vec<AllocationResultItem>>
where
    F: Fn(Range<usize>) -> Result<Vec<AllocationResultItem>> + Sync,
{
    let outcomes: Vec<_> = pool.install(|| {
        slices
            .par_iter()
            .map(|range| catch_unwind(AssertUnwindSafe(|| work(range.clone()))))
            .collect()
    });

    let mut items = Vec::new();
    for (slice, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(slice_items) => items.extend(slice_items?),
            Err(_) => {
                tracing::error!(slice, "allocation worker panicked");
                return Err(Error::WorkerPanicked { slice });
            }
        }
    }
    Ok(items)
}
