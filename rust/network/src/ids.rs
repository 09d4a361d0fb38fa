// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier and type discriminant definitions.
//!
//! Assets are addressed by a sparse, positive [`AssetId`] shared by the link
//! and node spaces. Id `0` is the "no asset" sentinel and is never indexed.
//! Topology edges are stored in a `slotmap::SlotMap` and addressed by
//! [`EdgeKey`], which stays valid while other edges are removed.

use slotmap::new_key_type;

/// Stable integer identifying a node or link within one network snapshot.
pub type AssetId = u32;

/// The "no asset" sentinel.
pub const NO_ASSET: AssetId = 0;

new_key_type! {
    /// Key for a topology edge (one link between two nodes).
    pub struct EdgeKey;
}

/// Discriminant for node assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Junction = 1,
    Tank = 2,
    Reservoir = 3,
}

impl NodeType {
    /// One-byte code used in encoded type arrays.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a type code, `None` for anything unknown.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(NodeType::Junction),
            2 => Some(NodeType::Tank),
            3 => Some(NodeType::Reservoir),
            _ => None,
        }
    }

    /// Returns the type name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Junction => "junction",
            NodeType::Tank => "tank",
            NodeType::Reservoir => "reservoir",
        }
    }
}

/// Discriminant for link assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkType {
    Pipe = 1,
    Valve = 2,
    Pump = 3,
}

impl LinkType {
    /// One-byte code used in encoded type arrays.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a type code, `None` for anything unknown.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LinkType::Pipe),
            2 => Some(LinkType::Valve),
            3 => Some(LinkType::Pump),
            _ => None,
        }
    }

    /// Returns the type name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Pipe => "pipe",
            LinkType::Valve => "valve",
            LinkType::Pump => "pump",
        }
    }
}

/// Type of any asset, tagged by the space it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    Link(LinkType),
    Node(NodeType),
}

impl AssetType {
    pub fn is_link(self) -> bool {
        matches!(self, AssetType::Link(_))
    }

    pub fn is_node(self) -> bool {
        matches!(self, AssetType::Node(_))
    }

    /// Returns the type name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Link(t) => t.as_str(),
            AssetType::Node(t) => t.as_str(),
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
