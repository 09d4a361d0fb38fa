// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Hydronet Allocation
//!
//! Connects customer points to the nearest eligible pipe of a
//! [`HydraulicModel`](hydronet_network::HydraulicModel) and assigns each one
//! to a junction at an end of that pipe.
//!
//! The network and the points are encoded once into immutable record
//! tables plus a packed spatial index over pipe segments ([`RunData`]).
//! Workers of a fixed [`rayon`] pool then search disjoint slices of the
//! points against those shared tables.
//!
//! ## Example
//!
//! ```
//! use hydronet_allocation::{
//!     allocate_customer_points, AllocationConfig, AllocationRule, CancellationToken, CustomerPoint,
//!     CustomerPoints,
//! };
//! use hydronet_network::{HydraulicModel, Position};
//!
//! let model = HydraulicModel::builder()
//!     .a_junction(1, Position::new(-95.4089633, 29.701228))
//!     .a_junction(2, Position::new(-95.4077939, 29.702706))
//!     .a_pipe(3, 1, 2, &[], 12.0)
//!     .build()?;
//!
//! let mut points = CustomerPoints::new();
//! points.insert(4, CustomerPoint::new(4, Position::new(-95.4084, 29.7019), 50.0));
//!
//! let result = allocate_customer_points(
//!     &model,
//!     &[AllocationRule::new(200.0, 15.0)],
//!     &points,
//!     &AllocationConfig::default(),
//!     &CancellationToken::new(),
//! )?;
//! assert_eq!(result.rule_matches, vec![1]);
//! assert_eq!(result.allocated[&4].connection().map(|c| c.junction_id), Some(1));
//! # Ok::<(), hydronet_allocation::Error>(())
//! ```

pub mod allocate;
pub mod cancel;
pub mod config;
pub mod customer_points;
pub mod error;
pub mod prepare;
pub mod run;

pub use allocate::{allocate_customer_points, AllocationResult};
pub use cancel::CancellationToken;
pub use config::{AllocationConfig, DEFAULT_BUCKET_SIZE_M};
pub use customer_points::{AllocationRule, Connection, CustomerPoint, CustomerPointId, CustomerPoints};
pub use error::{Error, Result};
pub use prepare::{CustomerPointRecord, NodeRecord, PipeRecord, RunData};
pub use run::{assign_junction, run_allocation, AllocationResultItem};
