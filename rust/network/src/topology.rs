// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node/link connectivity as an undirected multigraph.
//!
//! Edges live in a `SlotMap` keyed by [`EdgeKey`]. Each node keeps its
//! incident edges in insertion order and a `link id -> edge` map gives O(1)
//! removal by link id. Parallel links between the same node pair are
//! allowed; a self-loop is listed once on its node.
//!
//! Encoded form ([`TopologyBuffers`]), keyed by the asset index dense order:
//!
//! - `link_connections`: one `[start id, end id]` record per dense link.
//! - `node_connections`: one incident link id list per dense node.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::asset_index::{AssetIndexQueries, AssetIndexView};
use crate::buffers::{
    BinaryData, BufferKind, FixedSizeBufferBuilder, FixedSizeBufferView, IndexedBuffer, VariableRecord,
    VariableSizeBufferBuilder, VariableSizeBufferView,
};
use crate::error::{Error, Result};
use crate::ids::{AssetId, EdgeKey, NO_ASSET};

/// Query surface shared by [`Topology`] and [`TopologyView`].
pub trait TopologyQueries {
    fn has_link(&self, link_id: AssetId) -> bool;

    fn has_node(&self, node_id: AssetId) -> bool;

    /// Ids of the links touching `node_id`, in the order they were added.
    /// Empty when the node is unknown.
    fn links_of(&self, node_id: AssetId) -> Vec<AssetId>;

    /// `[start, end]` node ids of `link_id`, `[0, 0]` when unknown.
    fn nodes_of(&self, link_id: AssetId) -> [AssetId; 2];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    link_id: AssetId,
    start: AssetId,
    end: AssetId,
}

/// Mutable connectivity graph.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    edges: SlotMap<EdgeKey, Edge>,
    nodes: FxHashMap<AssetId, Vec<EdgeKey>>,
    link_edges: FxHashMap<AssetId, EdgeKey>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node with no links. No-op if it already exists.
    pub fn add_node(&mut self, node_id: AssetId) {
        self.nodes.entry(node_id).or_default();
    }

    /// Connects `start_node_id` and `end_node_id` through `link_id`,
    /// creating the nodes as needed. A link id that is already present is
    /// left untouched.
    pub fn add_link(&mut self, link_id: AssetId, start_node_id: AssetId, end_node_id: AssetId) {
        if self.link_edges.contains_key(&link_id) {
            return;
        }
        let key = self.edges.insert(Edge {
            link_id,
            start: start_node_id,
            end: end_node_id,
        });
        self.link_edges.insert(link_id, key);
        self.nodes.entry(start_node_id).or_default().push(key);
        let end_edges = self.nodes.entry(end_node_id).or_default();
        if start_node_id != end_node_id {
            end_edges.push(key);
        }
    }

    /// Removes a link. Its nodes stay in the graph.
    pub fn remove_link(&mut self, link_id: AssetId) {
        let Some(key) = self.link_edges.remove(&link_id) else {
            return;
        };
        if let Some(edge) = self.edges.remove(key) {
            for node_id in [edge.start, edge.end] {
                if let Some(incident) = self.nodes.get_mut(&node_id) {
                    incident.retain(|&k| k != key);
                }
            }
        }
    }

    /// Removes a node together with every link touching it.
    pub fn remove_node(&mut self, node_id: AssetId) {
        let Some(incident) = self.nodes.remove(&node_id) else {
            return;
        };
        for key in incident {
            let Some(edge) = self.edges.remove(key) else {
                continue;
            };
            self.link_edges.remove(&edge.link_id);
            let other = if edge.start == node_id { edge.end } else { edge.start };
            if let Some(other_edges) = self.nodes.get_mut(&other) {
                other_edges.retain(|&k| k != key);
            }
        }
    }

    pub fn link_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl TopologyQueries for Topology {
    fn has_link(&self, link_id: AssetId) -> bool {
        self.link_edges.contains_key(&link_id)
    }

    fn has_node(&self, node_id: AssetId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    fn links_of(&self, node_id: AssetId) -> Vec<AssetId> {
        self.nodes
            .get(&node_id)
            .map(|incident| {
                incident
                    .iter()
                    .filter_map(|&key| self.edges.get(key).map(|edge| edge.link_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn nodes_of(&self, link_id: AssetId) -> [AssetId; 2] {
        self.link_edges
            .get(&link_id)
            .and_then(|&key| self.edges.get(key))
            .map_or([NO_ASSET, NO_ASSET], |edge| [edge.start, edge.end])
    }
}

// --- Encoding ---

/// Encoded topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyBuffers {
    pub link_connections: BinaryData,
    pub node_connections: IndexedBuffer,
}

/// Writes a [`TopologyQueries`] source into [`TopologyBuffers`], laid out in
/// the dense order of an asset index.
///
/// `encode_link` may be called in any order. `encode_node` appends, so
/// nodes must be encoded in dense order. Both paths produce the same bytes
/// as `encode`.
pub struct TopologyEncoder<'a, T: TopologyQueries, Q: AssetIndexQueries> {
    topology: &'a T,
    asset_index: &'a Q,
    link_connections: FixedSizeBufferBuilder<[u32; 2]>,
    node_connections: VariableSizeBufferBuilder<Vec<u32>>,
}

impl<'a, T: TopologyQueries, Q: AssetIndexQueries> TopologyEncoder<'a, T, Q> {
    pub fn new(topology: &'a T, asset_index: &'a Q, kind: BufferKind) -> Self {
        let data_size: usize = asset_index
            .iter_nodes()
            .map(|(node_id, _)| topology.links_of(node_id).encoded_size())
            .sum();
        Self {
            topology,
            asset_index,
            link_connections: FixedSizeBufferBuilder::new(asset_index.link_count(), kind),
            node_connections: VariableSizeBufferBuilder::new(asset_index.node_count(), data_size, kind),
        }
    }

    pub fn encode_link(&mut self, link_id: AssetId) -> Result<()> {
        let index = self
            .asset_index
            .link_index(link_id)
            .ok_or(Error::UnknownAsset(link_id))?;
        self.link_connections
            .add_at_index(index, &self.topology.nodes_of(link_id))
    }

    pub fn encode_node(&mut self, node_id: AssetId) -> Result<()> {
        self.node_connections.add(&self.topology.links_of(node_id))
    }

    /// Encodes every indexed link and node, then finalizes.
    pub fn encode(mut self) -> Result<TopologyBuffers> {
        let asset_index = self.asset_index;
        for (link_id, _) in asset_index.iter_links() {
            self.encode_link(link_id)?;
        }
        for (node_id, _) in asset_index.iter_nodes() {
            self.encode_node(node_id)?;
        }
        Ok(self.finalize())
    }

    pub fn finalize(self) -> TopologyBuffers {
        let buffers = TopologyBuffers {
            link_connections: self.link_connections.finalize(),
            node_connections: self.node_connections.finalize(),
        };
        tracing::debug!(
            links = self.asset_index.link_count(),
            nodes = self.asset_index.node_count(),
            bytes = buffers.link_connections.len() + buffers.node_connections.data.len(),
            "topology encoded"
        );
        buffers
    }
}

// --- View ---

/// Read-only topology over [`TopologyBuffers`], resolving ids through an
/// [`AssetIndexView`] of the same snapshot.
#[derive(Debug, Clone)]
pub struct TopologyView<'v> {
    link_connections: FixedSizeBufferView<[u32; 2]>,
    node_connections: VariableSizeBufferView<Vec<u32>>,
    asset_index: &'v AssetIndexView,
}

impl<'v> TopologyView<'v> {
    pub fn new(buffers: TopologyBuffers, asset_index: &'v AssetIndexView) -> Result<Self> {
        let link_connections = FixedSizeBufferView::new(buffers.link_connections)?;
        let node_connections = VariableSizeBufferView::new(buffers.node_connections)?;
        if link_connections.count() != asset_index.link_count()
            || node_connections.count() != asset_index.node_count()
        {
            return Err(Error::MalformedBuffer(format!(
                "topology holds {} links and {} nodes, asset index {} and {}",
                link_connections.count(),
                node_connections.count(),
                asset_index.link_count(),
                asset_index.node_count()
            )));
        }
        Ok(Self {
            link_connections,
            node_connections,
            asset_index,
        })
    }
}

impl TopologyQueries for TopologyView<'_> {
    fn has_link(&self, link_id: AssetId) -> bool {
        self.asset_index.has_link(link_id)
    }

    fn has_node(&self, node_id: AssetId) -> bool {
        self.asset_index.has_node(node_id)
    }

    fn links_of(&self, node_id: AssetId) -> Vec<AssetId> {
        self.asset_index
            .node_index(node_id)
            .and_then(|index| self.node_connections.get_by_id(index).ok())
            .unwrap_or_default()
    }

    fn nodes_of(&self, link_id: AssetId) -> [AssetId; 2] {
        self.asset_index
            .link_index(link_id)
            .and_then(|index| self.link_connections.get_by_id(index).ok())
            .unwrap_or([NO_ASSET, NO_ASSET])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::asset::{Asset, AssetsMap, Link, Node};
    use crate::asset_index::{AssetIndex, AssetIndexEncoder};
    use crate::geometry::Position;
    use crate::ids::{LinkType, NodeType};

    /// Nodes 1..=4, links 10 (1-2), 11 (2-3), 12 (2-3 parallel), 13 (3-4).
    fn sample() -> (Topology, AssetIndex) {
        let links = [(10, 1, 2), (11, 2, 3), (12, 2, 3), (13, 3, 4)];
        let mut assets = AssetsMap::new();
        for id in 1..=4 {
            assets.insert(Asset::Node(Node {
                id,
                node_type: NodeType::Junction,
                position: Position::new(id as f64, 0.0),
            }));
        }
        for &(id, start, end) in &links {
            assets.insert(Asset::Link(Link {
                id,
                link_type: LinkType::Pipe,
                connections: [start, end],
                coordinates: vec![Position::new(start as f64, 0.0), Position::new(end as f64, 0.0)],
                diameter: 8.0,
            }));
        }

        let mut index = AssetIndex::new(Arc::new(assets));
        let mut topology = Topology::new();
        for id in 1..=4 {
            index.add_node(id).unwrap();
            topology.add_node(id);
        }
        for &(id, start, end) in &links {
            index.add_link(id).unwrap();
            topology.add_link(id, start, end);
        }
        (topology, index)
    }

    #[test]
    fn links_are_listed_in_insertion_order_with_parallels() {
        let (topology, _) = sample();
        assert_eq!(topology.links_of(2), vec![10, 11, 12]);
        assert_eq!(topology.links_of(3), vec![11, 12, 13]);
        assert_eq!(topology.nodes_of(12), [2, 3]);
        assert_eq!(topology.links_of(99), Vec::<AssetId>::new());
        assert_eq!(topology.nodes_of(99), [0, 0]);
    }

    #[test]
    fn duplicate_link_id_is_ignored() {
        let (mut topology, _) = sample();
        topology.add_link(10, 3, 4);
        assert_eq!(topology.nodes_of(10), [1, 2]);
        assert_eq!(topology.links_of(4), vec![13]);
    }

    #[test]
    fn self_loop_is_listed_once() {
        let mut topology = Topology::new();
        topology.add_link(5, 1, 1);
        assert_eq!(topology.links_of(1), vec![5]);
        topology.remove_node(1);
        assert!(!topology.has_link(5));
    }

    #[test]
    fn remove_link_keeps_nodes() {
        let (mut topology, _) = sample();
        topology.remove_link(10);
        assert!(!topology.has_link(10));
        assert!(topology.has_node(1));
        assert!(topology.links_of(1).is_empty());
        assert_eq!(topology.links_of(2), vec![11, 12]);
    }

    #[test]
    fn remove_node_cascades_to_incident_links() {
        let (mut topology, _) = sample();
        topology.remove_node(3);
        assert!(!topology.has_node(3));
        for link in [11, 12, 13] {
            assert!(!topology.has_link(link));
            assert_eq!(topology.nodes_of(link), [0, 0]);
        }
        assert_eq!(topology.links_of(2), vec![10]);
        assert!(topology.links_of(4).is_empty());
        assert_eq!(topology.link_count(), 1);
    }

    #[test]
    fn view_answers_like_live_topology() {
        let (topology, index) = sample();
        let index_view =
            AssetIndexView::new(AssetIndexEncoder::new(&index, BufferKind::Array).encode().unwrap()).unwrap();
        let buffers = TopologyEncoder::new(&topology, &index, BufferKind::Shared).encode().unwrap();
        let view = TopologyView::new(buffers, &index_view).unwrap();

        for node in 0..6 {
            assert_eq!(topology.links_of(node), view.links_of(node), "links of {node}");
            assert_eq!(topology.has_node(node), view.has_node(node));
        }
        for link in 9..15 {
            assert_eq!(topology.nodes_of(link), view.nodes_of(link), "nodes of {link}");
            assert_eq!(topology.has_link(link), view.has_link(link));
        }
    }

    #[test]
    fn incremental_and_full_encoding_are_byte_identical() {
        let (topology, index) = sample();
        let full = TopologyEncoder::new(&topology, &index, BufferKind::Array).encode().unwrap();

        let mut encoder = TopologyEncoder::new(&topology, &index, BufferKind::Array);
        for link_id in [13, 11, 10, 12] {
            encoder.encode_link(link_id).unwrap();
        }
        for (node_id, _) in index.iter_nodes() {
            encoder.encode_node(node_id).unwrap();
        }
        let incremental = encoder.finalize();

        assert_eq!(full, incremental);
    }

    #[test]
    fn encoding_an_unindexed_link_fails() {
        let (topology, index) = sample();
        let mut encoder = TopologyEncoder::new(&topology, &index, BufferKind::Array);
        assert_eq!(encoder.encode_link(77), Err(Error::UnknownAsset(77)));
    }
}
