// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-point nearest eligible pipe search over [`RunData`].
//!
//! For each rule in order, the search radius grows in fixed buckets up to
//! the rule's maximum distance. Within a bucket every new candidate segment
//! is either rejected for its pipe diameter or measured; the closest match
//! seen so far wins. As soon as a bucket leaves a match whose pipe has a
//! junction endpoint the point is connected and no further bucket is
//! searched.

use std::ops::Range;

use rustc_hash::FxHashSet;

use hydronet_network::geometry::{haversine_distance, nearest_point_on_segment};
use hydronet_network::{AssetId, Bounds, Position};

use crate::cancel::CancellationToken;
use crate::customer_points::{AllocationRule, Connection, CustomerPointId};
use crate::error::{Error, Result};
use crate::prepare::{NodeRecord, RunData};

/// Outcome for one customer point.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResultItem {
    pub customer_point_id: CustomerPointId,
    /// Index of the first rule that produced a connection.
    pub rule_index: Option<usize>,
    pub connection: Option<Connection>,
}

impl AllocationResultItem {
    fn disconnected(customer_point_id: CustomerPointId) -> Self {
        Self {
            customer_point_id,
            rule_index: None,
            connection: None,
        }
    }
}

/// Allocates the customer points in `range` (clamped to the table).
///
/// Buckets grow in steps of `bucket_size_m` while they stay within the
/// rule's maximum distance. A pipe between the last whole bucket and that
/// maximum is never found: with 30 m buckets a 200 m rule searches out to
/// 180 m only.
///
/// The token is checked before each point; once it is set the slice stops
/// with [`Error::Cancelled`].
pub fn run_allocation(
    data: &RunData,
    rules: &[AllocationRule],
    bucket_size_m: f64,
    range: Range<usize>,
    cancel: &CancellationToken,
) -> Result<Vec<AllocationResultItem>> {
    let end = range.end.min(data.customer_point_count());
    let start = range.start.min(end);
    let mut results = Vec::with_capacity(end - start);

    let no_segments = data.segment_index.num_items() == 0;
    for index in start..end {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let point = data.customer_points.get_by_id(index)?;
        if no_segments {
            results.push(AllocationResultItem::disconnected(point.id));
            continue;
        }

        let mut item = AllocationResultItem::disconnected(point.id);
        for (rule_index, rule) in rules.iter().enumerate() {
            if let Some(connection) = find_nearest_pipe_connection(data, &point.position, rule, bucket_size_m)? {
                item.rule_index = Some(rule_index);
                item.connection = Some(connection);
                break;
            }
        }
        results.push(item);
    }
    Ok(results)
}

struct Match {
    segment: usize,
    snap_point: Position,
    distance: f64,
}

fn find_nearest_pipe_connection(
    data: &RunData,
    point: &Position,
    rule: &AllocationRule,
    bucket_size_m: f64,
) -> Result<Option<Connection>> {
    if bucket_size_m <= 0.0 {
        return Ok(None);
    }

    let mut processed = FxHashSet::default();
    let mut closest: Option<Match> = None;

    let mut bucket = bucket_size_m;
    while bucket <= rule.max_distance {
        let search = Bounds::from_radius(point, bucket);
        for segment in data.segment_index.search(&search, |_, _| true) {
            if processed.contains(&segment) {
                continue;
            }
            let record = data.segments.get_by_id(segment)?;
            let pipe = data.pipes.get_by_id(record.link_index as usize)?;
            if pipe.diameter > rule.max_diameter {
                processed.insert(segment);
                continue;
            }

            let [a, b] = record.coords;
            let (snap_point, distance) = nearest_point_on_segment(point, &a, &b);
            // Left unprocessed: a larger bucket may still accept it.
            if distance > rule.max_distance || distance > bucket {
                continue;
            }
            if closest.as_ref().map_or(true, |best| distance < best.distance) {
                closest = Some(Match {
                    segment,
                    snap_point,
                    distance,
                });
            }
            processed.insert(segment);
        }

        if let Some(best) = &closest {
            let record = data.segments.get_by_id(best.segment)?;
            let pipe = data.pipes.get_by_id(record.link_index as usize)?;
            let start = data.nodes.get_by_id(pipe.start_node as usize)?;
            let end = data.nodes.get_by_id(pipe.end_node as usize)?;
            if let Some(junction_id) = assign_junction(&start, &end, &best.snap_point) {
                return Ok(Some(Connection {
                    pipe_id: pipe.id,
                    snap_point: best.snap_point,
                    junction_id,
                }));
            }
        }
        bucket += bucket_size_m;
    }
    Ok(None)
}

/// The pipe endpoint junction closest to `snap_point`; the start node wins
/// ties. Tanks and reservoirs never take customer demand.
pub fn assign_junction(start: &NodeRecord, end: &NodeRecord, snap_point: &Position) -> Option<AssetId> {
    match (start.is_junction(), end.is_junction()) {
        (false, false) => None,
        (true, false) => Some(start.id),
        (false, true) => Some(end.id),
        (true, true) => {
            let to_start = haversine_distance(snap_point, &start.position);
            let to_end = haversine_distance(snap_point, &end.position);
            Some(if to_end < to_start { end.id } else { start.id })
        }
    }
}

#[cfg(test)]
mod tests {
    use hydronet_network::{BufferKind, HydraulicModel, NodeType};

    use super::*;
    use crate::customer_points::CustomerPoint;

    fn node(id: AssetId, node_type: NodeType, x: f64) -> NodeRecord {
        NodeRecord {
            position: Position::new(x, 0.0),
            type_code: u32::from(node_type.code()),
            id,
        }
    }

    #[test]
    fn junction_assignment_skips_tanks_and_reservoirs() {
        let snap = Position::new(0.5, 0.0);
        let reservoir = node(1, NodeType::Reservoir, 0.0);
        let tank = node(2, NodeType::Tank, 1.0);
        assert_eq!(assign_junction(&reservoir, &tank, &snap), None);

        let junction = node(1, NodeType::Junction, 0.0);
        assert_eq!(assign_junction(&junction, &tank, &Position::new(0.9, 0.0)), Some(1));
        let junction = node(2, NodeType::Junction, 1.0);
        assert_eq!(assign_junction(&reservoir, &junction, &Position::new(0.1, 0.0)), Some(2));
    }

    #[test]
    fn junction_assignment_prefers_the_closer_end() {
        let start = node(1, NodeType::Junction, 0.0);
        let end = node(2, NodeType::Junction, 1.0);
        assert_eq!(assign_junction(&start, &end, &Position::new(0.1, 0.0)), Some(1));
        assert_eq!(assign_junction(&start, &end, &Position::new(0.75, 0.0)), Some(2));
        assert_eq!(assign_junction(&start, &end, &Position::new(0.5, 0.0)), Some(1));
    }

    /// Junction 1 and tank 2 joined by a pipe; the point sits next to the tank.
    fn tank_model() -> HydraulicModel {
        HydraulicModel::builder()
            .a_junction(1, Position::new(-95.4090, 29.7010))
            .a_tank(2, Position::new(-95.4080, 29.7010))
            .a_pipe(10, 1, 2, &[], 8.0)
            .build()
            .unwrap()
    }

    #[test]
    fn point_near_tank_goes_to_the_junction() {
        let points = [CustomerPoint::new(7, Position::new(-95.4081, 29.7011), 1.0)];
        let data = RunData::prepare(&tank_model(), points.iter(), BufferKind::Array).unwrap();
        let results = run_allocation(
            &data,
            &[AllocationRule::new(100.0, 10.0)],
            30.0,
            0..1,
            &CancellationToken::new(),
        )
        .unwrap();

        let connection = results[0].connection.unwrap();
        assert_eq!(results[0].rule_index, Some(0));
        assert_eq!(connection.pipe_id, 10);
        assert_eq!(connection.junction_id, 1);
    }

    #[test]
    fn range_is_clamped_to_the_table() {
        let points = [CustomerPoint::new(7, Position::new(-95.4081, 29.7011), 1.0)];
        let data = RunData::prepare(&tank_model(), points.iter(), BufferKind::Array).unwrap();
        let token = CancellationToken::new();
        let rules = [AllocationRule::default()];
        assert_eq!(run_allocation(&data, &rules, 30.0, 0..10, &token).unwrap().len(), 1);
        assert!(run_allocation(&data, &rules, 30.0, 5..10, &token).unwrap().is_empty());
    }

    #[test]
    fn cancelled_slice_stops() {
        let points = [CustomerPoint::new(7, Position::new(-95.4081, 29.7011), 1.0)];
        let data = RunData::prepare(&tank_model(), points.iter(), BufferKind::Array).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = run_allocation(&data, &[AllocationRule::default()], 30.0, 0..1, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn rule_below_first_bucket_never_matches() {
        let points = [CustomerPoint::new(7, Position::new(-95.4085, 29.70101), 1.0)];
        let data = RunData::prepare(&tank_model(), points.iter(), BufferKind::Array).unwrap();
        let results = run_allocation(
            &data,
            &[AllocationRule::new(20.0, 10.0)],
            30.0,
            0..1,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(results[0], AllocationResultItem::disconnected(7));
    }

    #[test]
    fn search_stops_at_the_last_whole_bucket() {
        // About 190 m north of the pipe.
        let points = [CustomerPoint::new(7, Position::new(-95.4085, 29.70271), 1.0)];
        let data = RunData::prepare(&tank_model(), points.iter(), BufferKind::Array).unwrap();
        let token = CancellationToken::new();

        let short = run_allocation(&data, &[AllocationRule::new(200.0, 10.0)], 30.0, 0..1, &token).unwrap();
        assert_eq!(short[0], AllocationResultItem::disconnected(7));

        let long = run_allocation(&data, &[AllocationRule::new(210.0, 10.0)], 30.0, 0..1, &token).unwrap();
        assert_eq!(long[0].connection.map(|c| c.junction_id), Some(1));
    }
}
