// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Hydronet Network
//!
//! Indexing layer of a hydraulic network digital twin.
//!
//! Every structure comes in two forms sharing one query trait:
//!
//! - a mutable in-memory structure kept up to date while the network is
//!   edited ([`AssetIndex`], [`Topology`], [`AssetsGeoIndex`]);
//! - a read-only view decoding compact byte buffers produced by the
//!   matching encoder ([`AssetIndexView`], [`TopologyView`],
//!   [`AssetsGeoView`]).
//!
//! Buffers are either plain heap allocations or reference-counted
//! [`bytes::Bytes`], which can be cloned into worker threads without
//! copying. A view answers every query exactly like the structure it was
//! encoded from.
//!
//! ## Example
//!
//! ```
//! use hydronet_network::{
//!     AssetIndexView, BufferKind, HydraulicModel, Position, TopologyQueries, TopologyView,
//! };
//!
//! let model = HydraulicModel::builder()
//!     .a_junction(1, Position::new(0.0, 0.0))
//!     .a_junction(2, Position::new(1.0, 0.0))
//!     .a_pipe(10, 1, 2, &[], 12.0)
//!     .build()?;
//!
//! let buffers = model.encode(BufferKind::Shared)?;
//! let index = AssetIndexView::new(buffers.asset_index)?;
//! let topology = TopologyView::new(buffers.topology, &index)?;
//! assert_eq!(topology.links_of(2), vec![10]);
//! # Ok::<(), hydronet_network::Error>(())
//! ```

pub mod asset;
pub mod asset_index;
pub mod assets_geo;
pub mod buffers;
pub mod error;
pub mod geo_index;
pub mod geometry;
pub mod ids;
pub mod model;
pub mod spatial_queries;
pub mod topology;

pub use asset::{Asset, AssetsMap, Link, Node};
pub use asset_index::{AssetIndex, AssetIndexBuffers, AssetIndexEncoder, AssetIndexQueries, AssetIndexView};
pub use assets_geo::{
    AssetsGeoBuffers, AssetsGeoEncoder, AssetsGeoIndex, AssetsGeoQueries, AssetsGeoView, SegmentId, SegmentRecord,
};
pub use buffers::{
    BinaryData, BufferKind, FixedRecord, FixedSizeBufferBuilder, FixedSizeBufferView, IndexedBuffer, VariableRecord,
    VariableSizeBufferBuilder, VariableSizeBufferView,
};
pub use error::{Error, Result};
pub use geo_index::{GeoIndex, GeoIndexBuilder};
pub use geometry::{Bounds, Position};
pub use ids::{AssetId, AssetType, LinkType, NodeType, NO_ASSET};
pub use model::{HydraulicModel, HydraulicModelBuilder, NetworkBuffers};
pub use spatial_queries::{query_contained_assets, SearchArea};
pub use topology::{Topology, TopologyBuffers, TopologyEncoder, TopologyQueries, TopologyView};
