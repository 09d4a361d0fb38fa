// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Allocation configuration loaded from environment variables.

use hydronet_network::BufferKind;

/// Radius increment of the bucketed nearest-pipe search, in meters.
pub const DEFAULT_BUCKET_SIZE_M: f64 = 30.0;

/// Allocation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationConfig {
    /// Number of worker threads (at least 1).
    pub workers: usize,
    /// Search radius increment in meters.
    pub bucket_size_m: f64,
    /// Buffer allocation for the encoded run data. Only `Shared` buffers
    /// are handed to the worker pool; `Array` runs on the calling thread.
    pub buffer_kind: BufferKind,
}

impl AllocationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            workers: std::env::var("HYDRONET_ALLOCATION_WORKERS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get())
                .max(1),
            bucket_size_m: std::env::var("HYDRONET_ALLOCATION_BUCKET_METERS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .unwrap_or(DEFAULT_BUCKET_SIZE_M),
            buffer_kind: std::env::var("HYDRONET_ALLOCATION_BUFFER_KIND")
                .ok()
                .and_then(|v| BufferKind::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_bucket_size(mut self, bucket_size_m: f64) -> Self {
        self.bucket_size_m = bucket_size_m;
        self
    }

    pub fn with_buffer_kind(mut self, buffer_kind: BufferKind) -> Self {
        self.buffer_kind = buffer_kind;
        self
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_environment() {
        let config = AllocationConfig::default()
            .with_workers(0)
            .with_bucket_size(10.0)
            .with_buffer_kind(BufferKind::Array);
        assert_eq!(config.workers, 1);
        assert_eq!(config.bucket_size_m, 10.0);
        assert_eq!(config.buffer_kind, BufferKind::Array);
    }
}
