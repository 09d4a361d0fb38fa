// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for network indexing and buffer encoding.
//!
//! Every variant here is a caller-bug defect. Expected absence (an id that
//! is not indexed, a link without geometry) is reported through `Option` or
//! an empty collection instead.

use crate::ids::AssetId;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing or encoding a network.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An indexed read fell outside the records held by a buffer or table.
    #[error("index {requested} is out of bounds (valid range: 0..{count})")]
    OutOfBounds { requested: usize, count: usize },

    /// Asset id 0 is the "no asset" sentinel and can never be indexed.
    #[error("asset id 0 is reserved and cannot be indexed")]
    ReservedAssetId,

    /// The backing asset map was replaced by one of a different size.
    #[error("asset index could not be updated: indexes {expected} assets, map holds {actual}")]
    AssetCountMismatch { expected: usize, actual: usize },

    /// An indexed link or node has no resolvable type in the asset map.
    #[error("{space} {id} not found in assets")]
    UnresolvedAssetType { space: &'static str, id: AssetId },

    /// A link polyline must have at least two vertices.
    #[error("link {id} has {vertices} vertices, at least 2 are required")]
    DegenerateLink { id: AssetId, vertices: usize },

    /// A link references a node that is not part of the model.
    #[error("asset {0} is not part of the network")]
    UnknownAsset(AssetId),

    /// A buffer is too short for the header or records it declares.
    #[error("malformed buffer: {0}")]
    MalformedBuffer(String),
}

impl Error {
    pub(crate) fn out_of_bounds(requested: usize, count: usize) -> Self {
        Error::OutOfBounds { requested, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_names_requested_and_valid_range() {
        let message = Error::out_of_bounds(7, 3).to_string();
        assert_eq!(message, "index 7 is out of bounds (valid range: 0..3)");
    }

    #[test]
    fn unresolved_type_names_space_and_id() {
        let err = Error::UnresolvedAssetType { space: "link", id: 12 };
        assert_eq!(err.to_string(), "link 12 not found in assets");
    }
}
