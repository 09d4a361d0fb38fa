// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run data: the network and customer points flattened into record tables
//! that workers read without touching the live model.
//!
//! Tables, all in [`hydronet_network::buffers`] fixed-size layout:
//!
//! - pipes: id, diameter, start and end node table indices;
//! - nodes: position, type code, id (asset index dense node order);
//! - segments: two coordinates and the owning pipe table index;
//! - customer points: id and position, in input order;
//!
//! plus a packed spatial index over the segment boxes.

use bytes::{Buf, BufMut};

use hydronet_network::buffers::{F64_SIZE, U32_SIZE};
use hydronet_network::{
    AssetId, AssetIndexQueries, Bounds, BufferKind, Error as NetworkError, FixedRecord, FixedSizeBufferBuilder,
    FixedSizeBufferView, GeoIndex, GeoIndexBuilder, HydraulicModel, LinkType, NodeType, Position, SegmentRecord,
};

use crate::customer_points::{CustomerPoint, CustomerPointId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeRecord {
    pub id: AssetId,
    pub diameter: f64,
    pub start_node: u32,
    pub end_node: u32,
}

impl FixedRecord for PipeRecord {
    const SIZE: usize = 3 * U32_SIZE + F64_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.id);
        buf.put_f64_le(self.diameter);
        buf.put_u32_le(self.start_node);
        buf.put_u32_le(self.end_node);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        Self {
            id: buf.get_u32_le(),
            diameter: buf.get_f64_le(),
            start_node: buf.get_u32_le(),
            end_node: buf.get_u32_le(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRecord {
    pub position: Position,
    pub type_code: u32,
    pub id: AssetId,
}

impl NodeRecord {
    pub fn is_junction(&self) -> bool {
        u8::try_from(self.type_code)
            .ok()
            .and_then(NodeType::from_code)
            == Some(NodeType::Junction)
    }
}

impl FixedRecord for NodeRecord {
    const SIZE: usize = 2 * F64_SIZE + 2 * U32_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.position.encode(buf);
        buf.put_u32_le(self.type_code);
        buf.put_u32_le(self.id);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        Self {
            position: Position::decode(buf),
            type_code: buf.get_u32_le(),
            id: buf.get_u32_le(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomerPointRecord {
    pub id: CustomerPointId,
    pub position: Position,
}

impl FixedRecord for CustomerPointRecord {
    const SIZE: usize = U32_SIZE + 2 * F64_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.id);
        self.position.encode(buf);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        Self {
            id: buf.get_u32_le(),
            position: Position::decode(buf),
        }
    }
}

/// Immutable tables shared by every worker of one allocation call.
#[derive(Debug, Clone)]
pub struct RunData {
    pub pipes: FixedSizeBufferView<PipeRecord>,
    pub nodes: FixedSizeBufferView<NodeRecord>,
    pub segments: FixedSizeBufferView<SegmentRecord>,
    pub customer_points: FixedSizeBufferView<CustomerPointRecord>,
    pub segment_index: GeoIndex,
}

impl RunData {
    /// Encodes the pipes and nodes of `model` and the given customer points.
    ///
    /// Pipes and nodes follow the asset index dense order. Valves and pumps
    /// are left out: customer points only connect to pipes.
    pub fn prepare<'a>(
        model: &HydraulicModel,
        customer_points: impl ExactSizeIterator<Item = &'a CustomerPoint>,
        kind: BufferKind,
    ) -> Result<Self> {
        let asset_index = model.asset_index();
        let assets = model.assets();

        let mut pipes = Vec::new();
        let mut segment_count = 0;
        for (id, _) in asset_index.iter_links() {
            let link = assets.link(id).ok_or(NetworkError::UnresolvedAssetType { space: "link", id })?;
            if link.link_type == LinkType::Pipe {
                segment_count += link.coordinates.len().saturating_sub(1);
                pipes.push(link);
            }
        }

        let mut nodes = FixedSizeBufferBuilder::<NodeRecord>::new(asset_index.node_count(), kind);
        for (id, index) in asset_index.iter_nodes() {
            let node = assets.node(id).ok_or(NetworkError::UnresolvedAssetType { space: "node", id })?;
            nodes.add_at_index(
                index,
                &NodeRecord {
                    position: node.position,
                    type_code: u32::from(node.node_type.code()),
                    id,
                },
            )?;
        }

        let node_index = |id: AssetId| -> Result<u32> {
            let index = asset_index.node_index(id).ok_or(NetworkError::UnknownAsset(id))?;
            Ok(index as u32)
        };

        let mut pipe_table = FixedSizeBufferBuilder::<PipeRecord>::new(pipes.len(), kind);
        let mut segments = FixedSizeBufferBuilder::<SegmentRecord>::new(segment_count, kind);
        let mut segment_index = GeoIndexBuilder::with_capacity(segment_count);
        for (pipe_index, pipe) in pipes.iter().enumerate() {
            pipe_table.add(&PipeRecord {
                id: pipe.id,
                diameter: pipe.diameter,
                start_node: node_index(pipe.connections[0])?,
                end_node: node_index(pipe.connections[1])?,
            })?;
            for coords in pipe.segments() {
                segments.add(&SegmentRecord {
                    coords,
                    link_index: pipe_index as u32,
                })?;
                segment_index.add(Bounds::new(
                    coords[0].x.min(coords[1].x),
                    coords[0].y.min(coords[1].y),
                    coords[0].x.max(coords[1].x),
                    coords[0].y.max(coords[1].y),
                ));
            }
        }

        let mut points = FixedSizeBufferBuilder::<CustomerPointRecord>::new(customer_points.len(), kind);
        for point in customer_points {
            points.add(&CustomerPointRecord {
                id: point.id(),
                position: point.coordinates(),
            })?;
        }

        let data = Self {
            pipes: FixedSizeBufferView::new(pipe_table.finalize())?,
            nodes: FixedSizeBufferView::new(nodes.finalize())?,
            segments: FixedSizeBufferView::new(segments.finalize())?,
            customer_points: FixedSizeBufferView::new(points.finalize())?,
            segment_index: GeoIndex::new(segment_index.finalize(kind))?,
        };
        tracing::debug!(
            kind = kind.as_str(),
            pipes = data.pipes.count(),
            nodes = data.nodes.count(),
            segments = data.segments.count(),
            customer_points = data.customer_points.count(),
            "allocation run data prepared"
        );
        Ok(data)
    }

    pub fn customer_point_count(&self) -> usize {
        self.customer_points.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer_points::CustomerPoints;

    fn p(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    fn model() -> HydraulicModel {
        HydraulicModel::builder()
            .a_reservoir(1, p(0.0, 0.0))
            .a_junction(2, p(1.0, 0.0))
            .a_junction(3, p(2.0, 0.0))
            .a_tank(4, p(3.0, 0.0))
            .a_pump(10, 1, 2)
            .a_pipe(11, 2, 3, &[p(1.5, 0.5)], 8.0)
            .a_pipe(12, 3, 4, &[], 16.0)
            .build()
            .unwrap()
    }

    #[test]
    fn only_pipes_are_encoded() {
        let data = RunData::prepare(&model(), std::iter::empty(), BufferKind::Array).unwrap();
        assert_eq!(data.pipes.count(), 2);
        assert_eq!(
            data.pipes.get_by_id(0).unwrap(),
            PipeRecord {
                id: 11,
                diameter: 8.0,
                start_node: 1,
                end_node: 2,
            }
        );
        assert_eq!(data.segments.count(), 3);
        assert_eq!(data.segments.get_by_id(2).unwrap().link_index, 1);
        assert_eq!(data.segment_index.num_items(), 3);
    }

    #[test]
    fn nodes_follow_dense_order() {
        let data = RunData::prepare(&model(), std::iter::empty(), BufferKind::Shared).unwrap();
        assert_eq!(data.nodes.count(), 4);
        let tank = data.nodes.get_by_id(3).unwrap();
        assert_eq!(tank.id, 4);
        assert!(!tank.is_junction());
        assert!(data.nodes.get_by_id(1).unwrap().is_junction());
    }

    #[test]
    fn customer_points_keep_input_order() {
        let points: CustomerPoints = [
            CustomerPoint::new(9, p(5.0, 5.0), 1.0),
            CustomerPoint::new(3, p(6.0, 6.0), 1.0),
        ]
        .into_iter()
        .map(|point| (point.id(), point))
        .collect();
        let data = RunData::prepare(&model(), points.values(), BufferKind::Array).unwrap();
        assert_eq!(data.customer_point_count(), 2);
        let ids: Vec<_> = data.customer_points.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[test]
    fn network_without_pipes_has_an_empty_segment_index() {
        let model = HydraulicModel::builder()
            .a_junction(1, p(0.0, 0.0))
            .build()
            .unwrap();
        let data = RunData::prepare(&model, std::iter::empty(), BufferKind::Array).unwrap();
        assert_eq!(data.segment_index.num_items(), 0);
        assert_eq!(data.segments.count(), 0);
    }
}
