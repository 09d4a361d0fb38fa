// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bidirectional mapping between sparse asset ids and the dense link and
//! node index spaces.
//!
//! Dense indices are insertion positions. Removing an id shifts every later
//! id of the same space down by one; re-adding a removed id appends it at
//! the end. An id lives in at most one space: adding it to one evicts it
//! from the other.
//!
//! Encoded form ([`AssetIndexBuffers`]):
//!
//! - `index`: one `u32` slot per id in `0..=max_asset_id`, after a
//!   `(link_count, node_count)` header. A slot packs the space in bit 31
//!   (link 0, node 1) and `dense index + 1` in the low 31 bits, so an empty
//!   slot is 0.
//! - `link_ids` / `node_ids`: dense index to id.
//! - `link_types` / `node_types`: dense index to one-byte type code.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::asset::AssetsMap;
use crate::buffers::{read_u32, write_u32, BinaryData, BufferKind, FixedSizeBufferBuilder, FixedSizeBufferView, U32_SIZE};
use crate::error::{Error, Result};
use crate::ids::{AssetId, AssetType, LinkType, NodeType, NO_ASSET};

/// Query surface shared by [`AssetIndex`] and [`AssetIndexView`].
pub trait AssetIndexQueries {
    fn link_count(&self) -> usize;

    fn node_count(&self) -> usize;

    /// Largest id the index can answer for.
    fn max_asset_id(&self) -> AssetId;

    fn has_link(&self, id: AssetId) -> bool {
        self.link_index(id).is_some()
    }

    fn has_node(&self, id: AssetId) -> bool {
        self.node_index(id).is_some()
    }

    /// `(id, dense index)` pairs in dense order.
    fn iter_links(&self) -> impl Iterator<Item = (AssetId, usize)> + '_;

    /// `(id, dense index)` pairs in dense order.
    fn iter_nodes(&self) -> impl Iterator<Item = (AssetId, usize)> + '_;

    fn link_index(&self, id: AssetId) -> Option<usize>;

    fn node_index(&self, id: AssetId) -> Option<usize>;

    fn link_id(&self, index: usize) -> Option<AssetId>;

    fn node_id(&self, index: usize) -> Option<AssetId>;

    fn link_type(&self, id: AssetId) -> Option<LinkType>;

    fn node_type(&self, id: AssetId) -> Option<NodeType>;

    fn asset_type(&self, id: AssetId) -> Option<AssetType> {
        self.link_type(id)
            .map(AssetType::Link)
            .or_else(|| self.node_type(id).map(AssetType::Node))
    }
}

// --- Live index ---

/// Space membership of an indexed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Link(usize),
    Node(usize),
}

/// Mutable asset index for the editing session.
#[derive(Debug, Clone)]
pub struct AssetIndex {
    assets: Arc<AssetsMap>,
    slots: FxHashMap<AssetId, Slot>,
    links: Vec<AssetId>,
    nodes: Vec<AssetId>,
    max_asset_id: AssetId,
}

impl AssetIndex {
    /// Creates an empty index resolving types through `assets`.
    pub fn new(assets: Arc<AssetsMap>) -> Self {
        Self {
            assets,
            slots: FxHashMap::default(),
            links: Vec::new(),
            nodes: Vec::new(),
            max_asset_id: NO_ASSET,
        }
    }

    /// The asset map used for type lookups.
    pub fn assets(&self) -> &Arc<AssetsMap> {
        &self.assets
    }

    /// Adds `id` to the link space. No-op if it is already a link.
    pub fn add_link(&mut self, id: AssetId) -> Result<()> {
        if id == NO_ASSET {
            return Err(Error::ReservedAssetId);
        }
        match self.slots.get(&id).copied() {
            Some(Slot::Link(_)) => return Ok(()),
            Some(Slot::Node(_)) => self.remove_node(id),
            None => {}
        }
        self.slots.insert(id, Slot::Link(self.links.len()));
        self.links.push(id);
        self.max_asset_id = self.max_asset_id.max(id);
        Ok(())
    }

    /// Adds `id` to the node space. No-op if it is already a node.
    pub fn add_node(&mut self, id: AssetId) -> Result<()> {
        if id == NO_ASSET {
            return Err(Error::ReservedAssetId);
        }
        match self.slots.get(&id).copied() {
            Some(Slot::Node(_)) => return Ok(()),
            Some(Slot::Link(_)) => self.remove_link(id),
            None => {}
        }
        self.slots.insert(id, Slot::Node(self.nodes.len()));
        self.nodes.push(id);
        self.max_asset_id = self.max_asset_id.max(id);
        Ok(())
    }

    pub fn remove_link(&mut self, id: AssetId) {
        if let Some(Slot::Link(index)) = self.slots.get(&id).copied() {
            self.slots.remove(&id);
            self.links.remove(index);
            for (shifted, later) in self.links[index..].iter().enumerate() {
                self.slots.insert(*later, Slot::Link(index + shifted));
            }
        }
    }

    pub fn remove_node(&mut self, id: AssetId) {
        if let Some(Slot::Node(index)) = self.slots.get(&id).copied() {
            self.slots.remove(&id);
            self.nodes.remove(index);
            for (shifted, later) in self.nodes[index..].iter().enumerate() {
                self.slots.insert(*later, Slot::Node(index + shifted));
            }
        }
    }

    /// Replaces the backing asset map.
    ///
    /// The new map must hold exactly one asset per indexed id.
    pub fn update_assets(&mut self, assets: Arc<AssetsMap>) -> Result<()> {
        let expected = self.links.len() + self.nodes.len();
        if assets.len() != expected {
            return Err(Error::AssetCountMismatch {
                expected,
                actual: assets.len(),
            });
        }
        self.assets = assets;
        Ok(())
    }
}

impl AssetIndexQueries for AssetIndex {
    fn link_count(&self) -> usize {
        self.links.len()
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn max_asset_id(&self) -> AssetId {
        self.max_asset_id
    }

    fn iter_links(&self) -> impl Iterator<Item = (AssetId, usize)> + '_ {
        self.links.iter().enumerate().map(|(index, &id)| (id, index))
    }

    fn iter_nodes(&self) -> impl Iterator<Item = (AssetId, usize)> + '_ {
        self.nodes.iter().enumerate().map(|(index, &id)| (id, index))
    }

    fn link_index(&self, id: AssetId) -> Option<usize> {
        match self.slots.get(&id) {
            Some(&Slot::Link(index)) => Some(index),
            _ => None,
        }
    }

    fn node_index(&self, id: AssetId) -> Option<usize> {
        match self.slots.get(&id) {
            Some(&Slot::Node(index)) => Some(index),
            _ => None,
        }
    }

    fn link_id(&self, index: usize) -> Option<AssetId> {
        self.links.get(index).copied()
    }

    fn node_id(&self, index: usize) -> Option<AssetId> {
        self.nodes.get(index).copied()
    }

    fn link_type(&self, id: AssetId) -> Option<LinkType> {
        self.link_index(id)?;
        self.assets.link(id).map(|link| link.link_type)
    }

    fn node_type(&self, id: AssetId) -> Option<NodeType> {
        self.node_index(id)?;
        self.assets.node(id).map(|node| node.node_type)
    }
}

// --- Encoding ---

const SPACE_LINK: u32 = 0;
const SPACE_NODE: u32 = 1;
const SLOT_INDEX_MASK: u32 = 0x7fff_ffff;
const HEADER_SIZE: usize = 2 * U32_SIZE;

fn pack_slot(space: u32, index: usize) -> u32 {
    (space << 31) | ((index as u32 + 1) & SLOT_INDEX_MASK)
}

fn unpack_slot(value: u32) -> Option<(u32, usize)> {
    if value == 0 {
        return None;
    }
    let index = (value & SLOT_INDEX_MASK) as usize;
    Some(((value >> 31) & 1, index.checked_sub(1)?))
}

/// Encoded asset index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIndexBuffers {
    pub index: BinaryData,
    pub link_ids: BinaryData,
    pub node_ids: BinaryData,
    pub link_types: BinaryData,
    pub node_types: BinaryData,
}

/// Writes an [`AssetIndexQueries`] source into [`AssetIndexBuffers`].
///
/// Buffers are sized from the source when the encoder is created. Entries
/// can be written one at a time with `encode_link`/`encode_node` in any
/// order, or all at once with `encode`; both produce the same bytes.
pub struct AssetIndexEncoder<'a, Q: AssetIndexQueries> {
    source: &'a Q,
    index: FixedSizeBufferBuilder<u32>,
    link_ids: FixedSizeBufferBuilder<u32>,
    node_ids: FixedSizeBufferBuilder<u32>,
    link_types: FixedSizeBufferBuilder<u8>,
    node_types: FixedSizeBufferBuilder<u8>,
}

impl<'a, Q: AssetIndexQueries> AssetIndexEncoder<'a, Q> {
    pub fn new(source: &'a Q, kind: BufferKind) -> Self {
        let link_count = source.link_count();
        let node_count = source.node_count();
        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header, 0, link_count as u32);
        write_u32(&mut header, U32_SIZE, node_count as u32);

        Self {
            source,
            index: FixedSizeBufferBuilder::with_header(source.max_asset_id() as usize + 1, kind, &header),
            link_ids: FixedSizeBufferBuilder::new(link_count, kind),
            node_ids: FixedSizeBufferBuilder::new(node_count, kind),
            link_types: FixedSizeBufferBuilder::new(link_count, kind),
            node_types: FixedSizeBufferBuilder::new(node_count, kind),
        }
    }

    pub fn encode_link(&mut self, id: AssetId, index: usize) -> Result<()> {
        let link_type = self
            .source
            .link_type(id)
            .ok_or(Error::UnresolvedAssetType { space: "link", id })?;
        self.index.add_at_index(id as usize, &pack_slot(SPACE_LINK, index))?;
        self.link_ids.add_at_index(index, &id)?;
        self.link_types.add_at_index(index, &link_type.code())
    }

    pub fn encode_node(&mut self, id: AssetId, index: usize) -> Result<()> {
        let node_type = self
            .source
            .node_type(id)
            .ok_or(Error::UnresolvedAssetType { space: "node", id })?;
        self.index.add_at_index(id as usize, &pack_slot(SPACE_NODE, index))?;
        self.node_ids.add_at_index(index, &id)?;
        self.node_types.add_at_index(index, &node_type.code())
    }

    /// Encodes every indexed node and link, then finalizes.
    pub fn encode(mut self) -> Result<AssetIndexBuffers> {
        let source = self.source;
        for (id, index) in source.iter_nodes() {
            self.encode_node(id, index)?;
        }
        for (id, index) in source.iter_links() {
            self.encode_link(id, index)?;
        }
        Ok(self.finalize())
    }

    pub fn finalize(self) -> AssetIndexBuffers {
        let buffers = AssetIndexBuffers {
            index: self.index.finalize(),
            link_ids: self.link_ids.finalize(),
            node_ids: self.node_ids.finalize(),
            link_types: self.link_types.finalize(),
            node_types: self.node_types.finalize(),
        };
        tracing::debug!(
            links = self.source.link_count(),
            nodes = self.source.node_count(),
            slots = self.source.max_asset_id() as usize + 1,
            bytes = buffers.index.len(),
            "asset index encoded"
        );
        buffers
    }
}

// --- View ---

/// Read-only asset index over [`AssetIndexBuffers`].
#[derive(Debug, Clone)]
pub struct AssetIndexView {
    index: FixedSizeBufferView<u32>,
    link_ids: FixedSizeBufferView<u32>,
    node_ids: FixedSizeBufferView<u32>,
    link_types: FixedSizeBufferView<u8>,
    node_types: FixedSizeBufferView<u8>,
    link_count: usize,
    node_count: usize,
}

impl AssetIndexView {
    pub fn new(buffers: AssetIndexBuffers) -> Result<Self> {
        let index = FixedSizeBufferView::<u32>::with_header(buffers.index, HEADER_SIZE)?;
        let link_count = read_u32(index.header(), 0) as usize;
        let node_count = read_u32(index.header(), U32_SIZE) as usize;
        let link_ids = FixedSizeBufferView::<u32>::new(buffers.link_ids)?;
        let node_ids = FixedSizeBufferView::<u32>::new(buffers.node_ids)?;
        let link_types = FixedSizeBufferView::<u8>::new(buffers.link_types)?;
        let node_types = FixedSizeBufferView::<u8>::new(buffers.node_types)?;

        if index.count() == 0
            || link_ids.count() != link_count
            || link_types.count() != link_count
            || node_ids.count() != node_count
            || node_types.count() != node_count
        {
            return Err(Error::MalformedBuffer(format!(
                "asset index header ({link_count} links, {node_count} nodes) does not match its tables"
            )));
        }

        Ok(Self {
            index,
            link_ids,
            node_ids,
            link_types,
            node_types,
            link_count,
            node_count,
        })
    }

    fn slot(&self, id: AssetId) -> Option<(u32, usize)> {
        // Bounded by the id-keyed slot count, not by the item counts.
        if id == NO_ASSET || id as usize >= self.index.count() {
            return None;
        }
        unpack_slot(self.index.get_by_id(id as usize).ok()?)
    }
}

impl AssetIndexQueries for AssetIndexView {
    fn link_count(&self) -> usize {
        self.link_count
    }

    fn node_count(&self) -> usize {
        self.node_count
    }

    fn max_asset_id(&self) -> AssetId {
        (self.index.count() - 1) as AssetId
    }

    fn iter_links(&self) -> impl Iterator<Item = (AssetId, usize)> + '_ {
        self.link_ids.enumerate().map(|(index, id)| (id, index))
    }

    fn iter_nodes(&self) -> impl Iterator<Item = (AssetId, usize)> + '_ {
        self.node_ids.enumerate().map(|(index, id)| (id, index))
    }

    fn link_index(&self, id: AssetId) -> Option<usize> {
        match self.slot(id)? {
            (SPACE_LINK, index) => Some(index),
            _ => None,
        }
    }

    fn node_index(&self, id: AssetId) -> Option<usize> {
        match self.slot(id)? {
            (SPACE_NODE, index) => Some(index),
            _ => None,
        }
    }

    fn link_id(&self, index: usize) -> Option<AssetId> {
        if index >= self.link_count {
            return None;
        }
        self.link_ids.get_by_id(index).ok()
    }

    fn node_id(&self, index: usize) -> Option<AssetId> {
        if index >= self.node_count {
            return None;
        }
        self.node_ids.get_by_id(index).ok()
    }

    fn link_type(&self, id: AssetId) -> Option<LinkType> {
        let index = self.link_index(id)?;
        LinkType::from_code(self.link_types.get_by_id(index).ok()?)
    }

    fn node_type(&self, id: AssetId) -> Option<NodeType> {
        let index = self.node_index(id)?;
        NodeType::from_code(self.node_types.get_by_id(index).ok()?)
    }
}
