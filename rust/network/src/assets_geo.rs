// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-asset geometry plus spatial indices over nodes and link segments.
//!
//! Every link polyline of `n` vertices is decomposed into `n - 1` two-point
//! segments when the index is created, in dense link order. Segment ids are
//! positions in that global sequence.
//!
//! The two spatial indices are built on first query and cached. Geometry
//! edits are not tracked: callers rebuild the whole index after changing
//! link vertices or node positions.
//!
//! Encoded form ([`AssetsGeoBuffers`]), keyed by asset index dense order:
//!
//! - `node_positions`: one position per dense node.
//! - `link_bounds`: one bounding box per dense link.
//! - `segments`: coordinates and owning link dense index per segment.
//! - `link_segments`: segment id list per dense link.
//! - `nodes_spatial_index` / `segments_spatial_index`: packed trees whose
//!   item indices are dense node indices and segment ids.

use std::sync::OnceLock;

use bytes::{Buf, BufMut};
use rustc_hash::FxHashMap;

use crate::asset_index::{AssetIndex, AssetIndexQueries, AssetIndexView};
use crate::buffers::{
    BinaryData, BufferKind, FixedRecord, FixedSizeBufferBuilder, FixedSizeBufferView, IndexedBuffer,
    VariableSizeBufferBuilder, VariableSizeBufferView, F64_SIZE, U32_SIZE,
};
use crate::error::{Error, Result};
use crate::geo_index::{GeoIndex, GeoIndexBuilder};
use crate::geometry::{Bounds, Position};
use crate::ids::AssetId;

/// Position of a segment in the global segment sequence.
pub type SegmentId = usize;

/// Query surface shared by [`AssetsGeoIndex`] and [`AssetsGeoView`].
pub trait AssetsGeoQueries {
    fn node_position(&self, id: AssetId) -> Option<Position>;

    /// Bounding box of the full link polyline.
    fn link_bounds(&self, id: AssetId) -> Option<Bounds>;

    fn segment_count(&self) -> usize;

    fn segment_coords(&self, segment: SegmentId) -> Result<[Position; 2]>;

    fn segment_link_id(&self, segment: SegmentId) -> Result<AssetId>;

    /// Segment ids of a link in vertex order, empty when unknown.
    fn link_segments(&self, id: AssetId) -> Vec<SegmentId>;

    /// Ids of nodes whose position falls in `bounds` and passes `filter`.
    ///
    /// The filter receives the node id and its (point) box.
    fn search_nodes<F>(&self, bounds: &Bounds, filter: F) -> Vec<AssetId>
    where
        F: FnMut(AssetId, &Bounds) -> bool;

    /// Ids of segments whose box intersects `bounds` and passes `filter`.
    ///
    /// The filter receives the segment id and its box, so callers can layer
    /// exact containment on top of the box candidates.
    fn search_link_segments<F>(&self, bounds: &Bounds, filter: F) -> Vec<SegmentId>
    where
        F: FnMut(SegmentId, &Bounds) -> bool;

    /// Up to `max_count` nodes closest to `position`, nearest first, within
    /// `max_distance` coordinate units.
    fn neighbouring_nodes(&self, position: &Position, max_count: usize, max_distance: f64) -> Vec<AssetId>;
}

fn segment_bounds(coords: &[Position; 2]) -> Bounds {
    Bounds::new(
        coords[0].x.min(coords[1].x),
        coords[0].y.min(coords[1].y),
        coords[0].x.max(coords[1].x),
        coords[0].y.max(coords[1].y),
    )
}

// --- Live index ---

#[derive(Debug, Clone)]
struct Segment {
    link_id: AssetId,
    coords: [Position; 2],
}

/// Geometry index over the assets of an [`AssetIndex`].
#[derive(Debug)]
pub struct AssetsGeoIndex<'a> {
    asset_index: &'a AssetIndex,
    segments: Vec<Segment>,
    link_segments: FxHashMap<AssetId, Vec<SegmentId>>,
    nodes_index: OnceLock<GeoIndex>,
    segments_index: OnceLock<GeoIndex>,
}

impl<'a> AssetsGeoIndex<'a> {
    /// Decomposes every indexed link into segments.
    ///
    /// Fails when an indexed asset is missing from the asset map or a link
    /// has fewer than two vertices.
    pub fn new(asset_index: &'a AssetIndex) -> Result<Self> {
        let assets = asset_index.assets();
        for (id, _) in asset_index.iter_nodes() {
            assets
                .node(id)
                .ok_or(Error::UnresolvedAssetType { space: "node", id })?;
        }

        let mut segments = Vec::new();
        let mut link_segments: FxHashMap<AssetId, Vec<SegmentId>> = FxHashMap::default();
        for (id, _) in asset_index.iter_links() {
            let link = assets
                .link(id)
                .ok_or(Error::UnresolvedAssetType { space: "link", id })?;
            if link.coordinates.len() < 2 {
                return Err(Error::DegenerateLink {
                    id,
                    vertices: link.coordinates.len(),
                });
            }
            let ids = link_segments.entry(id).or_default();
            for coords in link.segments() {
                ids.push(segments.len());
                segments.push(Segment { link_id: id, coords });
            }
        }

        Ok(Self {
            asset_index,
            segments,
            link_segments,
            nodes_index: OnceLock::new(),
            segments_index: OnceLock::new(),
        })
    }

    fn nodes_index(&self) -> &GeoIndex {
        self.nodes_index.get_or_init(|| {
            let assets = self.asset_index.assets();
            let mut builder = GeoIndexBuilder::with_capacity(self.asset_index.node_count());
            for (id, _) in self.asset_index.iter_nodes() {
                let position = assets.node(id).map_or(Position::origin(), |node| node.position);
                builder.add_point(&position);
            }
            tracing::debug!(nodes = builder.len(), "node spatial index built");
            builder.build()
        })
    }

    fn segments_index(&self) -> &GeoIndex {
        self.segments_index.get_or_init(|| {
            let mut builder = GeoIndexBuilder::with_capacity(self.segments.len());
            for segment in &self.segments {
                builder.add(segment_bounds(&segment.coords));
            }
            tracing::debug!(segments = builder.len(), "segment spatial index built");
            builder.build()
        })
    }

    fn segment(&self, segment: SegmentId) -> Result<&Segment> {
        self.segments
            .get(segment)
            .ok_or(Error::out_of_bounds(segment, self.segments.len()))
    }
}

impl AssetsGeoQueries for AssetsGeoIndex<'_> {
    fn node_position(&self, id: AssetId) -> Option<Position> {
        self.asset_index.node_index(id)?;
        self.asset_index.assets().node(id).map(|node| node.position)
    }

    fn link_bounds(&self, id: AssetId) -> Option<Bounds> {
        self.asset_index.link_index(id)?;
        self.asset_index.assets().link(id).and_then(|link| link.bounds())
    }

    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_coords(&self, segment: SegmentId) -> Result<[Position; 2]> {
        self.segment(segment).map(|s| s.coords)
    }

    fn segment_link_id(&self, segment: SegmentId) -> Result<AssetId> {
        self.segment(segment).map(|s| s.link_id)
    }

    fn link_segments(&self, id: AssetId) -> Vec<SegmentId> {
        if !self.asset_index.has_link(id) {
            return Vec::new();
        }
        self.link_segments.get(&id).cloned().unwrap_or_default()
    }

    fn search_nodes<F>(&self, bounds: &Bounds, mut filter: F) -> Vec<AssetId>
    where
        F: FnMut(AssetId, &Bounds) -> bool,
    {
        if self.asset_index.node_count() == 0 {
            return Vec::new();
        }
        self.nodes_index()
            .search(bounds, |index, b| {
                self.asset_index.node_id(index).is_some_and(|id| filter(id, b))
            })
            .into_iter()
            .filter_map(|index| self.asset_index.node_id(index))
            .collect()
    }

    fn search_link_segments<F>(&self, bounds: &Bounds, filter: F) -> Vec<SegmentId>
    where
        F: FnMut(SegmentId, &Bounds) -> bool,
    {
        if self.segments.is_empty() {
            return Vec::new();
        }
        self.segments_index().search(bounds, filter)
    }

    fn neighbouring_nodes(&self, position: &Position, max_count: usize, max_distance: f64) -> Vec<AssetId> {
        self.nodes_index()
            .neighbors(position.x, position.y, max_count, max_distance)
            .into_iter()
            .filter_map(|index| self.asset_index.node_id(index))
            .collect()
    }
}

// --- Encoding ---

/// Encoded segment: its two coordinates and the dense index of its link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentRecord {
    pub coords: [Position; 2],
    pub link_index: u32,
}

impl FixedRecord for SegmentRecord {
    const SIZE: usize = 4 * F64_SIZE + U32_SIZE;

    fn encode<B: BufMut>(&self, buf: &mut B) {
        for p in &self.coords {
            buf.put_f64_le(p.x);
            buf.put_f64_le(p.y);
        }
        buf.put_u32_le(self.link_index);
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        let a = Position::decode(buf);
        let b = Position::decode(buf);
        Self {
            coords: [a, b],
            link_index: buf.get_u32_le(),
        }
    }
}

/// Encoded assets geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetsGeoBuffers {
    pub node_positions: BinaryData,
    pub link_bounds: BinaryData,
    pub segments: BinaryData,
    pub link_segments: IndexedBuffer,
    pub nodes_spatial_index: BinaryData,
    pub segments_spatial_index: BinaryData,
}

/// Writes an [`AssetsGeoQueries`] source into [`AssetsGeoBuffers`], laid out
/// in the dense order of an asset index.
///
/// `encode_node` may be called in any order. `encode_link` appends the
/// link's segment list, so links must be encoded in dense order.
pub struct AssetsGeoEncoder<'a, G: AssetsGeoQueries, Q: AssetIndexQueries> {
    geo: &'a G,
    asset_index: &'a Q,
    kind: BufferKind,
    node_positions: FixedSizeBufferBuilder<Position>,
    link_bounds: FixedSizeBufferBuilder<Bounds>,
    segments: FixedSizeBufferBuilder<SegmentRecord>,
    link_segments: VariableSizeBufferBuilder<Vec<u32>>,
    node_boxes: Vec<Bounds>,
    segment_boxes: Vec<Bounds>,
}

impl<'a, G: AssetsGeoQueries, Q: AssetIndexQueries> AssetsGeoEncoder<'a, G, Q> {
    pub fn new(geo: &'a G, asset_index: &'a Q, kind: BufferKind) -> Self {
        let node_count = asset_index.node_count();
        let link_count = asset_index.link_count();
        let segment_count = geo.segment_count();
        let empty = Bounds::new(0.0, 0.0, 0.0, 0.0);
        Self {
            geo,
            asset_index,
            kind,
            node_positions: FixedSizeBufferBuilder::new(node_count, kind),
            link_bounds: FixedSizeBufferBuilder::new(link_count, kind),
            segments: FixedSizeBufferBuilder::new(segment_count, kind),
            link_segments: VariableSizeBufferBuilder::new(link_count, U32_SIZE * (link_count + segment_count), kind),
            node_boxes: vec![empty; node_count],
            segment_boxes: vec![empty; segment_count],
        }
    }

    pub fn encode_node(&mut self, id: AssetId, index: usize) -> Result<()> {
        let position = self
            .geo
            .node_position(id)
            .ok_or(Error::UnresolvedAssetType { space: "node", id })?;
        self.node_positions.add_at_index(index, &position)?;
        self.node_boxes[index] = Bounds::of_point(&position);
        Ok(())
    }

    pub fn encode_link(&mut self, id: AssetId, index: usize) -> Result<()> {
        let bounds = self
            .geo
            .link_bounds(id)
            .ok_or(Error::UnresolvedAssetType { space: "link", id })?;
        self.link_bounds.add_at_index(index, &bounds)?;

        let segment_ids = self.geo.link_segments(id);
        for &segment in &segment_ids {
            let coords = self.geo.segment_coords(segment)?;
            self.segments.add_at_index(
                segment,
                &SegmentRecord {
                    coords,
                    link_index: index as u32,
                },
            )?;
            self.segment_boxes[segment] = segment_bounds(&coords);
        }
        let segment_ids: Vec<u32> = segment_ids.into_iter().map(|s| s as u32).collect();
        self.link_segments.add(&segment_ids)
    }

    /// Encodes every indexed node and link, then finalizes.
    pub fn encode(mut self) -> Result<AssetsGeoBuffers> {
        let asset_index = self.asset_index;
        for (id, index) in asset_index.iter_nodes() {
            self.encode_node(id, index)?;
        }
        for (id, index) in asset_index.iter_links() {
            self.encode_link(id, index)?;
        }
        Ok(self.finalize())
    }

    pub fn finalize(self) -> AssetsGeoBuffers {
        let mut nodes_index = GeoIndexBuilder::with_capacity(self.node_boxes.len());
        for b in self.node_boxes {
            nodes_index.add(b);
        }
        let mut segments_index = GeoIndexBuilder::with_capacity(self.segment_boxes.len());
        for b in self.segment_boxes {
            segments_index.add(b);
        }

        let buffers = AssetsGeoBuffers {
            node_positions: self.node_positions.finalize(),
            link_bounds: self.link_bounds.finalize(),
            segments: self.segments.finalize(),
            link_segments: self.link_segments.finalize(),
            nodes_spatial_index: nodes_index.finalize(self.kind),
            segments_spatial_index: segments_index.finalize(self.kind),
        };
        tracing::debug!(
            nodes = self.asset_index.node_count(),
            links = self.asset_index.link_count(),
            segments = self.geo.segment_count(),
            "assets geometry encoded"
        );
        buffers
    }
}

// --- View ---

/// Read-only geometry index over [`AssetsGeoBuffers`], resolving ids
/// through an [`AssetIndexView`] of the same snapshot.
#[derive(Debug, Clone)]
pub struct AssetsGeoView<'v> {
    asset_index: &'v AssetIndexView,
    node_positions: FixedSizeBufferView<Position>,
    link_bounds: FixedSizeBufferView<Bounds>,
    segments: FixedSizeBufferView<SegmentRecord>,
    link_segments: VariableSizeBufferView<Vec<u32>>,
    nodes_index: GeoIndex,
    segments_index: GeoIndex,
}

impl<'v> AssetsGeoView<'v> {
    pub fn new(buffers: AssetsGeoBuffers, asset_index: &'v AssetIndexView) -> Result<Self> {
        let node_positions = FixedSizeBufferView::new(buffers.node_positions)?;
        let link_bounds = FixedSizeBufferView::new(buffers.link_bounds)?;
        let segments = FixedSizeBufferView::new(buffers.segments)?;
        let link_segments = VariableSizeBufferView::new(buffers.link_segments)?;
        let nodes_index = GeoIndex::new(buffers.nodes_spatial_index)?;
        let segments_index = GeoIndex::new(buffers.segments_spatial_index)?;

        if node_positions.count() != asset_index.node_count()
            || link_bounds.count() != asset_index.link_count()
            || link_segments.count() != asset_index.link_count()
            || nodes_index.num_items() != node_positions.count()
            || segments_index.num_items() != segments.count()
        {
            return Err(Error::MalformedBuffer(
                "assets geometry tables do not match the asset index".to_string(),
            ));
        }

        Ok(Self {
            asset_index,
            node_positions,
            link_bounds,
            segments,
            link_segments,
            nodes_index,
            segments_index,
        })
    }
}

impl AssetsGeoQueries for AssetsGeoView<'_> {
    fn node_position(&self, id: AssetId) -> Option<Position> {
        let index = self.asset_index.node_index(id)?;
        self.node_positions.get_by_id(index).ok()
    }

    fn link_bounds(&self, id: AssetId) -> Option<Bounds> {
        let index = self.asset_index.link_index(id)?;
        self.link_bounds.get_by_id(index).ok()
    }

    fn segment_count(&self) -> usize {
        self.segments.count()
    }

    fn segment_coords(&self, segment: SegmentId) -> Result<[Position; 2]> {
        self.segments.get_by_id(segment).map(|record| record.coords)
    }

    fn segment_link_id(&self, segment: SegmentId) -> Result<AssetId> {
        let record = self.segments.get_by_id(segment)?;
        let index = record.link_index as usize;
        self.asset_index
            .link_id(index)
            .ok_or(Error::out_of_bounds(index, self.asset_index.link_count()))
    }

    fn link_segments(&self, id: AssetId) -> Vec<SegmentId> {
        self.asset_index
            .link_index(id)
            .and_then(|index| self.link_segments.get_by_id(index).ok())
            .map(|ids| ids.into_iter().map(|s| s as SegmentId).collect())
            .unwrap_or_default()
    }

    fn search_nodes<F>(&self, bounds: &Bounds, mut filter: F) -> Vec<AssetId>
    where
        F: FnMut(AssetId, &Bounds) -> bool,
    {
        self.nodes_index
            .search(bounds, |index, b| {
                self.asset_index.node_id(index).is_some_and(|id| filter(id, b))
            })
            .into_iter()
            .filter_map(|index| self.asset_index.node_id(index))
            .collect()
    }

    fn search_link_segments<F>(&self, bounds: &Bounds, filter: F) -> Vec<SegmentId>
    where
        F: FnMut(SegmentId, &Bounds) -> bool,
    {
        self.segments_index.search(bounds, filter)
    }

    fn neighbouring_nodes(&self, position: &Position, max_count: usize, max_distance: f64) -> Vec<AssetId> {
        self.nodes_index
            .neighbors(position.x, position.y, max_count, max_distance)
            .into_iter()
            .filter_map(|index| self.asset_index.node_id(index))
            .collect()
    }
}
