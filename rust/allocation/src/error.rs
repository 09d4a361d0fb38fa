// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for customer-point allocation.

/// Result type alias for allocation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that fail a whole allocation call.
///
/// A point that cannot be connected is not an error; it is reported in the
/// disconnected map of the result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encoding or reading the network failed.
    #[error(transparent)]
    Network(#[from] hydronet_network::Error),

    /// The cancellation token was triggered before the call completed.
    #[error("allocation was cancelled")]
    Cancelled,

    /// A worker panicked while processing its slice of customer points.
    #[error("allocation worker for slice {slice} panicked")]
    WorkerPanicked { slice: usize },

    /// The worker pool could not be started.
    #[error("failed to build allocation thread pool: {0}")]
    ThreadPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_keep_their_message() {
        let err = Error::from(hydronet_network::Error::OutOfBounds {
            requested: 4,
            count: 2,
        });
        assert_eq!(err.to_string(), "index 4 is out of bounds (valid range: 0..2)");
    }

    #[test]
    fn worker_panic_names_slice() {
        assert_eq!(
            Error::WorkerPanicked { slice: 3 }.to_string(),
            "allocation worker for slice 3 panicked"
        );
    }
}
