// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network snapshot tying assets, asset index and topology together.

use std::sync::Arc;

use crate::asset::{Asset, AssetsMap, Link, Node};
use crate::asset_index::{AssetIndex, AssetIndexBuffers, AssetIndexEncoder};
use crate::assets_geo::{AssetsGeoBuffers, AssetsGeoEncoder, AssetsGeoIndex};
use crate::buffers::BufferKind;
use crate::error::{Error, Result};
use crate::geometry::Position;
use crate::ids::{AssetId, LinkType, NodeType};
use crate::topology::{Topology, TopologyBuffers, TopologyEncoder};

/// One consistent snapshot of a hydraulic network.
#[derive(Debug, Clone)]
pub struct HydraulicModel {
    assets: Arc<AssetsMap>,
    asset_index: AssetIndex,
    topology: Topology,
}

/// Every encoded table of a [`HydraulicModel`], ready to hand to views on
/// other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBuffers {
    pub asset_index: AssetIndexBuffers,
    pub topology: TopologyBuffers,
    pub assets_geo: AssetsGeoBuffers,
}

impl HydraulicModel {
    pub fn builder() -> HydraulicModelBuilder {
        HydraulicModelBuilder::new()
    }

    pub fn assets(&self) -> &Arc<AssetsMap> {
        &self.assets
    }

    pub fn asset_index(&self) -> &AssetIndex {
        &self.asset_index
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Builds the geometry index of this snapshot.
    pub fn assets_geo(&self) -> Result<AssetsGeoIndex<'_>> {
        AssetsGeoIndex::new(&self.asset_index)
    }

    /// Encodes the asset index, topology and geometry into `kind` buffers.
    pub fn encode(&self, kind: BufferKind) -> Result<NetworkBuffers> {
        let geo = self.assets_geo()?;
        let buffers = NetworkBuffers {
            asset_index: AssetIndexEncoder::new(&self.asset_index, kind).encode()?,
            topology: TopologyEncoder::new(&self.topology, &self.asset_index, kind).encode()?,
            assets_geo: AssetsGeoEncoder::new(&geo, &self.asset_index, kind).encode()?,
        };
        tracing::debug!(kind = kind.as_str(), assets = self.assets.len(), "network encoded");
        Ok(buffers)
    }
}

#[derive(Debug, Clone)]
struct PendingLink {
    id: AssetId,
    link_type: LinkType,
    connections: [AssetId; 2],
    vertices: Vec<Position>,
    diameter: f64,
}

/// Incremental construction of a [`HydraulicModel`].
///
/// Link polylines run from the start node position through the given
/// intermediate vertices to the end node position. Nodes may be declared
/// after the links that use them; connections are resolved in
/// [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct HydraulicModelBuilder {
    nodes: Vec<Node>,
    links: Vec<PendingLink>,
}

impl HydraulicModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(mut self, id: AssetId, node_type: NodeType, position: Position) -> Self {
        self.nodes.push(Node {
            id,
            node_type,
            position,
        });
        self
    }

    fn link(
        mut self,
        id: AssetId,
        link_type: LinkType,
        connections: [AssetId; 2],
        vertices: &[Position],
        diameter: f64,
    ) -> Self {
        self.links.push(PendingLink {
            id,
            link_type,
            connections,
            vertices: vertices.to_vec(),
            diameter,
        });
        self
    }

    pub fn a_junction(self, id: AssetId, position: Position) -> Self {
        self.node(id, NodeType::Junction, position)
    }

    pub fn a_tank(self, id: AssetId, position: Position) -> Self {
        self.node(id, NodeType::Tank, position)
    }

    pub fn a_reservoir(self, id: AssetId, position: Position) -> Self {
        self.node(id, NodeType::Reservoir, position)
    }

    pub fn a_pipe(self, id: AssetId, start: AssetId, end: AssetId, vertices: &[Position], diameter: f64) -> Self {
        self.link(id, LinkType::Pipe, [start, end], vertices, diameter)
    }

    pub fn a_valve(self, id: AssetId, start: AssetId, end: AssetId, diameter: f64) -> Self {
        self.link(id, LinkType::Valve, [start, end], &[], diameter)
    }

    pub fn a_pump(self, id: AssetId, start: AssetId, end: AssetId) -> Self {
        self.link(id, LinkType::Pump, [start, end], &[], 0.0)
    }

    /// Resolves link geometry and indexes every asset in declaration order.
    ///
    /// Fails with [`Error::UnknownAsset`] when a link references a node that
    /// was never declared and with [`Error::ReservedAssetId`] for id 0.
    pub fn build(self) -> Result<HydraulicModel> {
        let mut assets = AssetsMap::new();
        for node in &self.nodes {
            assets.insert(Asset::Node(node.clone()));
        }

        let mut links = Vec::with_capacity(self.links.len());
        for pending in self.links {
            let [start, end] = pending.connections;
            let start_position = endpoint(&assets, start)?;
            let end_position = endpoint(&assets, end)?;

            let mut coordinates = Vec::with_capacity(pending.vertices.len() + 2);
            coordinates.push(start_position);
            coordinates.extend(pending.vertices);
            coordinates.push(end_position);

            links.push(Link {
                id: pending.id,
                link_type: pending.link_type,
                connections: pending.connections,
                coordinates,
                diameter: pending.diameter,
            });
        }
        for link in &links {
            assets.insert(Asset::Link(link.clone()));
        }

        let assets = Arc::new(assets);
        let mut asset_index = AssetIndex::new(Arc::clone(&assets));
        let mut topology = Topology::new();
        for node in &self.nodes {
            asset_index.add_node(node.id)?;
            topology.add_node(node.id);
        }
        for link in &links {
            asset_index.add_link(link.id)?;
            topology.add_link(link.id, link.connections[0], link.connections[1]);
        }

        tracing::debug!(nodes = self.nodes.len(), links = links.len(), "hydraulic model built");
        Ok(HydraulicModel {
            assets,
            asset_index,
            topology,
        })
    }
}

fn endpoint(assets: &AssetsMap, id: AssetId) -> Result<Position> {
    assets
        .node(id)
        .map(|node| node.position)
        .ok_or(Error::UnknownAsset(id))
}
