// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Area selection: which assets lie entirely inside a search area.
//!
//! Candidates come from the box queries of an [`AssetsGeoQueries`] source;
//! exact containment is layered on top through the search filters. A node
//! is selected when its position is inside the area, a link only when every
//! one of its segments is.

use rustc_hash::FxHashSet;

use crate::assets_geo::{AssetsGeoQueries, SegmentId};
use crate::error::Result;
use crate::geometry::{
    is_axis_aligned_rectangle, is_convex, point_in_polygon, segment_in_polygon, Bounds, Position,
};
use crate::ids::AssetId;

/// Region to select assets in.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchArea {
    Bounds(Bounds),
    /// Circle around a longitude/latitude center. Selection uses its degree
    /// bounding box.
    Radius { center: Position, radius_m: f64 },
    /// Polygon ring, open or closed.
    Polygon(Vec<Position>),
}

enum Region {
    Bounds(Bounds),
    Polygon {
        bounds: Bounds,
        ring: Vec<Position>,
        convex: bool,
    },
}

impl Region {
    fn bounds(&self) -> &Bounds {
        match self {
            Region::Bounds(bounds) => bounds,
            Region::Polygon { bounds, .. } => bounds,
        }
    }

    fn contains_node(&self, position: &Position) -> bool {
        match self {
            Region::Bounds(_) => true,
            Region::Polygon { ring, .. } => point_in_polygon(position, ring),
        }
    }

    fn contains_segment(&self, segment_bounds: &Bounds, [a, b]: &[Position; 2]) -> bool {
        if !self.bounds().contains(segment_bounds) {
            return false;
        }
        match self {
            Region::Bounds(_) => true,
            // Convexity guarantees that a segment with both ends inside stays inside.
            Region::Polygon { ring, convex: true, .. } => {
                point_in_polygon(a, ring) && point_in_polygon(b, ring)
            }
            Region::Polygon { ring, convex: false, .. } => segment_in_polygon(a, b, ring),
        }
    }
}

impl SearchArea {
    /// `None` for polygons with fewer than three vertices, which select nothing.
    fn region(&self) -> Option<Region> {
        match self {
            SearchArea::Bounds(bounds) => Some(Region::Bounds(*bounds)),
            SearchArea::Radius { center, radius_m } => {
                Some(Region::Bounds(Bounds::from_radius(center, *radius_m)))
            }
            SearchArea::Polygon(ring) => {
                let bounds = Bounds::from_points(ring)?;
                if is_axis_aligned_rectangle(ring) {
                    return Some(Region::Bounds(bounds));
                }
                if ring.len() < 3 {
                    return None;
                }
                Some(Region::Polygon {
                    bounds,
                    ring: ring.clone(),
                    convex: is_convex(ring),
                })
            }
        }
    }
}

/// Ids of nodes and links fully contained in `area`: selected nodes first,
/// then links in the order their first candidate segment was found.
pub fn query_contained_assets<G: AssetsGeoQueries>(geo: &G, area: &SearchArea) -> Result<Vec<AssetId>> {
    let Some(region) = area.region() else {
        return Ok(Vec::new());
    };

    let mut selected = geo.search_nodes(region.bounds(), |id, _| {
        geo.node_position(id)
            .is_some_and(|position| region.contains_node(&position))
    });

    let contained: Vec<SegmentId> = geo.search_link_segments(region.bounds(), |segment, bounds| {
        geo.segment_coords(segment)
            .is_ok_and(|coords| region.contains_segment(bounds, &coords))
    });
    let contained_set: FxHashSet<SegmentId> = contained.iter().copied().collect();

    let mut checked = FxHashSet::default();
    for &segment in &contained {
        if checked.contains(&segment) {
            continue;
        }
        let link_id = geo.segment_link_id(segment)?;
        let mut all_contained = true;
        for link_segment in geo.link_segments(link_id) {
            checked.insert(link_segment);
            all_contained &= contained_set.contains(&link_segment);
        }
        if all_contained {
            selected.push(link_id);
        }
    }

    tracing::debug!(selected = selected.len(), "area selection");
    Ok(selected)
}
