// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network assets and the id-keyed asset map.

use rustc_hash::FxHashMap;

use crate::geometry::{Bounds, Position};
use crate::ids::{AssetId, AssetType, LinkType, NodeType};

/// A point asset: junction, tank or reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: AssetId,
    pub node_type: NodeType,
    pub position: Position,
}

/// A linear asset: pipe, valve or pump.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: AssetId,
    pub link_type: LinkType,
    /// Start and end node ids.
    pub connections: [AssetId; 2],
    /// Polyline vertices, start node first.
    pub coordinates: Vec<Position>,
    /// Internal diameter (model units). Pumps carry 0.
    pub diameter: f64,
}

impl Link {
    /// Bounding box of the full polyline.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.coordinates)
    }

    /// Consecutive vertex pairs of the polyline.
    pub fn segments(&self) -> impl Iterator<Item = [Position; 2]> + '_ {
        self.coordinates.windows(2).map(|w| [w[0], w[1]])
    }
}

/// Any network asset.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Node(Node),
    Link(Link),
}

impl Asset {
    pub fn id(&self) -> AssetId {
        match self {
            Asset::Node(node) => node.id,
            Asset::Link(link) => link.id,
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            Asset::Node(node) => AssetType::Node(node.node_type),
            Asset::Link(link) => AssetType::Link(link.link_type),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Asset::Node(node) => Some(node),
            Asset::Link(_) => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Asset::Link(link) => Some(link),
            Asset::Node(_) => None,
        }
    }
}

/// Id-keyed store of every asset in a network snapshot.
#[derive(Debug, Clone, Default)]
pub struct AssetsMap {
    assets: FxHashMap<AssetId, Asset>,
}

impl AssetsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an asset, returning the previous one.
    pub fn insert(&mut self, asset: Asset) -> Option<Asset> {
        self.assets.insert(asset.id(), asset)
    }

    pub fn remove(&mut self, id: AssetId) -> Option<Asset> {
        self.assets.remove(&id)
    }

    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(&id)
    }

    pub fn node(&self, id: AssetId) -> Option<&Node> {
        self.get(id).and_then(Asset::as_node)
    }

    pub fn link(&self, id: AssetId) -> Option<&Link> {
        self.get(id).and_then(Asset::as_link)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Iterates assets in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }
}

impl FromIterator<Asset> for AssetsMap {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        let mut map = Self::new();
        for asset in iter {
            map.insert(asset);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> Link {
        Link {
            id: 3,
            link_type: LinkType::Pipe,
            connections: [1, 2],
            coordinates: vec![
                Position::new(0.0, 0.0),
                Position::new(2.0, 1.0),
                Position::new(3.0, -1.0),
            ],
            diameter: 12.0,
        }
    }

    #[test]
    fn link_bounds_cover_all_vertices() {
        assert_eq!(pipe().bounds(), Some(Bounds::new(0.0, -1.0, 3.0, 1.0)));
    }

    #[test]
    fn link_segments_pair_consecutive_vertices() {
        let link = pipe();
        let segments: Vec<_> = link.segments().collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], [link.coordinates[1], link.coordinates[2]]);
    }

    #[test]
    fn map_lookups_by_space() {
        let map: AssetsMap = [
            Asset::Node(Node {
                id: 1,
                node_type: NodeType::Junction,
                position: Position::new(0.0, 0.0),
            }),
            Asset::Link(pipe()),
        ]
        .into_iter()
        .collect();

        assert_eq!(map.len(), 2);
        assert!(map.node(1).is_some());
        assert!(map.link(1).is_none());
        assert_eq!(
            map.get(3).map(Asset::asset_type),
            Some(AssetType::Link(LinkType::Pipe))
        );
    }
}
