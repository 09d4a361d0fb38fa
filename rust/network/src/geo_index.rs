// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static, bulk-loaded 2D spatial index (packed Hilbert R-tree).
//!
//! Boxes are appended to a [`GeoIndexBuilder`], then `finalize` sorts them
//! along a Hilbert curve, packs them into nodes of [`NODE_SIZE`] entries and
//! serializes the tree into one buffer. [`GeoIndex`] answers queries by
//! reading that buffer directly, so the live structures and the binary
//! views share one implementation.
//!
//! Serialized layout:
//!
//! ```text
//! [num_items u32][node_size u32][num_nodes u32][num_levels u32]
//! [level_bounds u32 * num_levels]
//! [boxes: (min_x, min_y, max_x, max_y) f64 * num_nodes]
//! [indices u32 * num_nodes]
//! ```
//!
//! Leaf entries hold the item's insertion position; parent entries hold the
//! position of their first child.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::BufMut;

use crate::buffers::{read_f64, read_u32, require_len, BinaryData, BufferKind, RawBuffer, F64_SIZE, U32_SIZE};
use crate::error::{Error, Result};
use crate::geometry::{Bounds, Position};

/// Number of entries packed into each tree node.
pub const NODE_SIZE: usize = 16;

const HEADER_FIELDS: usize = 4;
const BOX_SIZE: usize = 4 * F64_SIZE;
const HILBERT_MAX: f64 = 65_535.0;

/// Collects item boxes for a [`GeoIndex`].
///
/// `finalize` consumes the builder, so no item can be added afterwards.
#[derive(Debug, Clone, Default)]
pub struct GeoIndexBuilder {
    boxes: Vec<Bounds>,
}

impl GeoIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
        }
    }

    /// Adds an item box and returns its item index.
    pub fn add(&mut self, bounds: Bounds) -> usize {
        self.boxes.push(bounds);
        self.boxes.len() - 1
    }

    /// Adds a point item and returns its item index.
    pub fn add_point(&mut self, position: &Position) -> usize {
        self.add(Bounds::of_point(position))
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Bulk-loads the tree and serializes it.
    ///
    /// An empty builder still produces a valid index: one degenerate
    /// placeholder box is packed while the recorded item count stays 0, so
    /// every query on it returns nothing.
    pub fn finalize(self, kind: BufferKind) -> BinaryData {
        self.pack(kind).0
    }

    /// Bulk-loads the tree on heap memory and opens it for queries.
    pub fn build(self) -> GeoIndex {
        let (data, layout) = self.pack(BufferKind::Array);
        GeoIndex { data, layout }
    }

    fn pack(self, kind: BufferKind) -> (BinaryData, Layout) {
        let num_items = self.boxes.len();
        let mut items = self.boxes;
        if items.is_empty() {
            items.push(Bounds::new(0.0, 0.0, 0.0, 0.0));
        }
        let n = items.len();

        let level_bounds = level_bounds(n, NODE_SIZE);
        let num_nodes = level_bounds.last().copied().unwrap_or(n);
        let extent = items
            .iter()
            .copied()
            .reduce(union)
            .unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0));

        let (boxes, indices) = if n <= NODE_SIZE {
            let mut boxes = items;
            let mut indices: Vec<u32> = (0..n as u32).collect();
            boxes.push(extent);
            indices.push(0);
            (boxes, indices)
        } else {
            sort_and_pack(items, &level_bounds, extent, num_nodes)
        };

        let layout = Layout::new(num_items, NODE_SIZE, num_nodes, level_bounds);
        let size = layout.indices_offset + num_nodes * U32_SIZE;
        let mut raw = RawBuffer::zeroed(size, kind);
        let mut out = raw.as_mut_slice();
        out.put_u32_le(num_items as u32);
        out.put_u32_le(NODE_SIZE as u32);
        out.put_u32_le(num_nodes as u32);
        out.put_u32_le(layout.level_bounds.len() as u32);
        for bound in &layout.level_bounds {
            out.put_u32_le(*bound as u32);
        }
        for b in &boxes {
            out.put_f64_le(b.min_x);
            out.put_f64_le(b.min_y);
            out.put_f64_le(b.max_x);
            out.put_f64_le(b.max_y);
        }
        for index in &indices {
            out.put_u32_le(*index);
        }

        tracing::debug!(items = num_items, nodes = num_nodes, bytes = size, "geo index packed");
        (raw.freeze(), layout)
    }
}

/// Header fields and section offsets of a serialized tree.
#[derive(Debug, Clone)]
struct Layout {
    num_items: usize,
    node_size: usize,
    num_nodes: usize,
    level_bounds: Vec<usize>,
    boxes_offset: usize,
    indices_offset: usize,
}

impl Layout {
    fn new(num_items: usize, node_size: usize, num_nodes: usize, level_bounds: Vec<usize>) -> Self {
        let boxes_offset = U32_SIZE * (HEADER_FIELDS + level_bounds.len());
        Self {
            num_items,
            node_size,
            num_nodes,
            level_bounds,
            boxes_offset,
            indices_offset: boxes_offset + num_nodes * BOX_SIZE,
        }
    }
}

/// Cumulative entry count at the end of each tree level, leaves first.
fn level_bounds(num_items: usize, node_size: usize) -> Vec<usize> {
    let mut count = num_items;
    let mut num_nodes = num_items;
    let mut bounds = vec![num_nodes];
    loop {
        count = count.div_ceil(node_size);
        num_nodes += count;
        bounds.push(num_nodes);
        if count == 1 {
            break;
        }
    }
    bounds
}

fn union(a: Bounds, b: Bounds) -> Bounds {
    Bounds::new(
        a.min_x.min(b.min_x),
        a.min_y.min(b.min_y),
        a.max_x.max(b.max_x),
        a.max_y.max(b.max_y),
    )
}

/// Sorts leaves along the Hilbert curve and builds the parent levels.
fn sort_and_pack(items: Vec<Bounds>, level_bounds: &[usize], extent: Bounds, num_nodes: usize) -> (Vec<Bounds>, Vec<u32>) {
    let width = non_zero(extent.max_x - extent.min_x);
    let height = non_zero(extent.max_y - extent.min_y);

    let hilbert_values: Vec<u32> = items
        .iter()
        .map(|b| {
            let center = b.center();
            let x = (HILBERT_MAX * (center.x - extent.min_x) / width).floor() as u32;
            let y = (HILBERT_MAX * (center.y - extent.min_y) / height).floor() as u32;
            hilbert(x, y)
        })
        .collect();

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| hilbert_values[i]);

    let mut boxes: Vec<Bounds> = Vec::with_capacity(num_nodes);
    let mut indices: Vec<u32> = Vec::with_capacity(num_nodes);
    for &i in &order {
        boxes.push(items[i]);
        indices.push(i as u32);
    }

    let mut pos = 0;
    for &end in &level_bounds[..level_bounds.len() - 1] {
        while pos < end {
            let node_index = pos;
            let mut node_box = boxes[pos];
            pos += 1;
            for _ in 1..NODE_SIZE {
                if pos >= end {
                    break;
                }
                node_box = union(node_box, boxes[pos]);
                pos += 1;
            }
            boxes.push(node_box);
            indices.push(node_index as u32);
        }
    }

    (boxes, indices)
}

fn non_zero(span: f64) -> f64 {
    if span == 0.0 {
        1.0
    } else {
        span
    }
}

/// Position of `(x, y)` along a 16-bit Hilbert curve.
fn hilbert(x: u32, y: u32) -> u32 {
    let mut a = x ^ y;
    let mut b = 0xFFFF ^ a;
    let mut c = 0xFFFF ^ (x | y);
    let mut d = x & (y ^ 0xFFFF);

    let mut aa = a | (b >> 1);
    let mut bb = (a >> 1) ^ a;
    let mut cc = ((c >> 1) ^ (b & (d >> 1))) ^ c;
    let mut dd = ((a & (c >> 1)) ^ (d >> 1)) ^ d;

    a = aa;
    b = bb;
    c = cc;
    d = dd;
    aa = (a & (a >> 2)) ^ (b & (b >> 2));
    bb = (a & (b >> 2)) ^ (b & ((a ^ b) >> 2));
    cc ^= (a & (c >> 2)) ^ (b & (d >> 2));
    dd ^= (b & (c >> 2)) ^ ((a ^ b) & (d >> 2));

    a = aa;
    b = bb;
    c = cc;
    d = dd;
    aa = (a & (a >> 4)) ^ (b & (b >> 4));
    bb = (a & (b >> 4)) ^ (b & ((a ^ b) >> 4));
    cc ^= (a & (c >> 4)) ^ (b & (d >> 4));
    dd ^= (b & (c >> 4)) ^ ((a ^ b) & (d >> 4));

    a = aa;
    b = bb;
    c = cc;
    d = dd;
    cc ^= (a & (c >> 8)) ^ (b & (d >> 8));
    dd ^= (b & (c >> 8)) ^ ((a ^ b) & (d >> 8));

    a = cc ^ (cc >> 1);
    b = dd ^ (dd >> 1);

    let mut i0 = x ^ y;
    let mut i1 = b | (0xFFFF ^ (i0 | a));

    i0 = (i0 | (i0 << 8)) & 0x00FF_00FF;
    i0 = (i0 | (i0 << 4)) & 0x0F0F_0F0F;
    i0 = (i0 | (i0 << 2)) & 0x3333_3333;
    i0 = (i0 | (i0 << 1)) & 0x5555_5555;

    i1 = (i1 | (i1 << 8)) & 0x00FF_00FF;
    i1 = (i1 | (i1 << 4)) & 0x0F0F_0F0F;
    i1 = (i1 | (i1 << 2)) & 0x3333_3333;
    i1 = (i1 | (i1 << 1)) & 0x5555_5555;

    (i1 << 1) | i0
}

// --- Queries ---

/// Read-only spatial index over a serialized packed tree.
#[derive(Debug, Clone)]
pub struct GeoIndex {
    data: BinaryData,
    layout: Layout,
}

impl GeoIndex {
    /// Opens a buffer written by [`GeoIndexBuilder::finalize`].
    pub fn new(data: BinaryData) -> Result<Self> {
        require_len(&data, U32_SIZE * HEADER_FIELDS, "geo index header")?;
        let num_items = read_u32(&data, 0) as usize;
        let node_size = read_u32(&data, U32_SIZE) as usize;
        let num_nodes = read_u32(&data, 2 * U32_SIZE) as usize;
        let num_levels = read_u32(&data, 3 * U32_SIZE) as usize;
        if node_size < 2 || num_levels == 0 {
            return Err(Error::MalformedBuffer(format!(
                "geo index with node size {node_size} and {num_levels} levels"
            )));
        }
        require_len(&data, U32_SIZE * (HEADER_FIELDS + num_levels), "geo index level bounds")?;

        let level_bounds: Vec<usize> = (0..num_levels)
            .map(|i| read_u32(&data, U32_SIZE * (HEADER_FIELDS + i)) as usize)
            .collect();
        if level_bounds.last() != Some(&num_nodes) || num_items > num_nodes {
            return Err(Error::MalformedBuffer(format!(
                "geo index level bounds end at {:?}, expected {num_nodes}",
                level_bounds.last()
            )));
        }

        let layout = Layout::new(num_items, node_size, num_nodes, level_bounds);
        require_len(&data, layout.indices_offset + num_nodes * U32_SIZE, "geo index nodes")?;
        Ok(Self { data, layout })
    }

    /// Builds an index over `boxes` on ordinary heap memory.
    pub fn from_boxes(boxes: impl IntoIterator<Item = Bounds>) -> Self {
        let mut builder = GeoIndexBuilder::new();
        for b in boxes {
            builder.add(b);
        }
        builder.build()
    }

    /// Number of indexed items (the placeholder of an empty index excluded).
    pub fn num_items(&self) -> usize {
        self.layout.num_items
    }

    pub fn data(&self) -> &BinaryData {
        &self.data
    }

    fn box_at(&self, pos: usize) -> Bounds {
        let offset = self.layout.boxes_offset + pos * BOX_SIZE;
        Bounds::new(
            read_f64(&self.data, offset),
            read_f64(&self.data, offset + F64_SIZE),
            read_f64(&self.data, offset + 2 * F64_SIZE),
            read_f64(&self.data, offset + 3 * F64_SIZE),
        )
    }

    fn index_at(&self, pos: usize) -> usize {
        read_u32(&self.data, self.layout.indices_offset + pos * U32_SIZE) as usize
    }

    /// End of the level containing entry `pos`.
    fn upper_bound(&self, pos: usize) -> usize {
        self.layout
            .level_bounds
            .iter()
            .copied()
            .find(|&bound| bound > pos)
            .unwrap_or(self.layout.num_nodes)
    }

    fn node_end(&self, node: usize) -> usize {
        (node + self.layout.node_size).min(self.upper_bound(node))
    }

    /// Item indices whose boxes intersect `bounds` and pass `filter`.
    ///
    /// The filter receives the item index and the item's box.
    pub fn search<F>(&self, bounds: &Bounds, mut filter: F) -> Vec<usize>
    where
        F: FnMut(usize, &Bounds) -> bool,
    {
        let mut results = Vec::new();
        if self.layout.num_items == 0 {
            return results;
        }

        let mut stack = Vec::new();
        let mut node = Some(self.layout.num_nodes - 1);
        while let Some(start) = node {
            for pos in start..self.node_end(start) {
                let entry = self.box_at(pos);
                if !bounds.intersects(&entry) {
                    continue;
                }
                let index = self.index_at(pos);
                if start >= self.layout.num_items {
                    stack.push(index);
                } else if filter(index, &entry) {
                    results.push(index);
                }
            }
            node = stack.pop();
        }
        results
    }

    /// Up to `max_results` item indices ordered by increasing box distance
    /// from `(x, y)`, none farther than `max_distance` (coordinate units).
    pub fn neighbors(&self, x: f64, y: f64, max_results: usize, max_distance: f64) -> Vec<usize> {
        let mut results = Vec::new();
        if self.layout.num_items == 0 || max_results == 0 {
            return results;
        }

        let max_dist_sq = max_distance * max_distance;
        let mut queue = BinaryHeap::new();
        let mut node = Some(self.layout.num_nodes - 1);

        'search: while let Some(start) = node {
            for pos in start..self.node_end(start) {
                let entry = self.box_at(pos);
                let dx = axis_distance(x, entry.min_x, entry.max_x);
                let dy = axis_distance(y, entry.min_y, entry.max_y);
                let dist = dx * dx + dy * dy;
                if dist > max_dist_sq {
                    continue;
                }
                queue.push(Candidate {
                    dist,
                    is_item: start < self.layout.num_items,
                    index: self.index_at(pos),
                });
            }

            while queue.peek().is_some_and(|c| c.is_item) {
                let Some(candidate) = queue.pop() else { break };
                results.push(candidate.index);
                if results.len() == max_results {
                    break 'search;
                }
            }

            node = queue.pop().map(|c| c.index);
        }
        results
    }
}

fn axis_distance(k: f64, min: f64, max: f64) -> f64 {
    if k < min {
        min - k
    } else if k <= max {
        0.0
    } else {
        k - max
    }
}

/// Queue entry for nearest-neighbour search, popped closest first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f64,
    is_item: bool,
    index: usize,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; ties go to items, then lower index.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| self.is_item.cmp(&other.is_item))
            .then_with(|| other.index.cmp(&self.index))
    }
}
