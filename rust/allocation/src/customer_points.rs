// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Customer points, their pipe connections and allocation rules.

use std::collections::BTreeMap;

use hydronet_network::{AssetId, Position};

pub type CustomerPointId = u32;

/// Customer points keyed by id. Iteration order is id order.
pub type CustomerPoints = BTreeMap<CustomerPointId, CustomerPoint>;

/// Where a customer point draws its demand from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub pipe_id: AssetId,
    /// Closest point on the pipe.
    pub snap_point: Position,
    /// Pipe endpoint junction that receives the demand.
    pub junction_id: AssetId,
}

/// A demand location, optionally connected to a pipe.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerPoint {
    id: CustomerPointId,
    label: String,
    coordinates: Position,
    base_demand: f64,
    connection: Option<Connection>,
}

impl CustomerPoint {
    pub fn new(id: CustomerPointId, coordinates: Position, base_demand: f64) -> Self {
        Self {
            id,
            label: id.to_string(),
            coordinates,
            base_demand,
            connection: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn id(&self) -> CustomerPointId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn coordinates(&self) -> Position {
        self.coordinates
    }

    pub fn base_demand(&self) -> f64 {
        self.base_demand
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn snap_position(&self) -> Option<Position> {
        self.connection.map(|c| c.snap_point)
    }

    pub fn connect(&mut self, connection: Connection) {
        self.connection = Some(connection);
    }

    /// Copy with the same id, label, position and demand but no connection.
    pub fn copy_disconnected(&self) -> Self {
        Self {
            connection: None,
            ..self.clone()
        }
    }
}

/// Eligibility limits for one allocation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationRule {
    /// Maximum distance from the point to the pipe, in meters.
    pub max_distance: f64,
    /// Largest pipe diameter a point may connect to, in model units.
    pub max_diameter: f64,
}

impl AllocationRule {
    pub fn new(max_distance: f64, max_diameter: f64) -> Self {
        Self {
            max_distance,
            max_diameter,
        }
    }
}

impl Default for AllocationRule {
    /// 100 m, 300 mm.
    fn default() -> Self {
        Self::new(100.0, 300.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_disconnected_drops_only_the_connection() {
        let mut point = CustomerPoint::new(4, Position::new(1.0, 2.0), 50.0).with_label("Shop");
        point.connect(Connection {
            pipe_id: 3,
            snap_point: Position::new(1.5, 2.0),
            junction_id: 1,
        });

        let copy = point.copy_disconnected();
        assert!(copy.connection().is_none());
        assert_eq!(copy.id(), 4);
        assert_eq!(copy.label(), "Shop");
        assert_eq!(copy.base_demand(), 50.0);
        assert_eq!(point.snap_position(), Some(Position::new(1.5, 2.0)));
    }

    #[test]
    fn label_defaults_to_id() {
        assert_eq!(CustomerPoint::new(12, Position::new(0.0, 0.0), 0.0).label(), "12");
    }
}
