// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar and geodesic helpers over longitude/latitude positions.
//!
//! Positions are `(x = longitude, y = latitude)` in degrees. Containment
//! predicates work in the plane of the coordinates; distances are geodesic
//! (haversine) in meters.

use nalgebra::Point2;

/// A longitude/latitude position.
pub type Position = Point2<f64>;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Approximate meters per degree of latitude, used to turn a radius into a
/// degree bounding box.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

const EPSILON: f64 = 1e-12;

// --- Bounds ---

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box around a single position.
    pub fn of_point(p: &Position) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// Bounding box of a set of positions, `None` when empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Position>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::of_point(first);
        for p in iter {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        Some(bounds)
    }

    /// Degree bounding box of a circle of `radius_m` meters around `center`.
    ///
    /// The longitude span is widened by `1 / cos(latitude)`.
    pub fn from_radius(center: &Position, radius_m: f64) -> Self {
        let delta_lat = radius_m / METERS_PER_DEGREE;
        let delta_lng = radius_m / (METERS_PER_DEGREE * center.y.to_radians().cos());
        Self::new(
            center.x - delta_lng,
            center.y - delta_lat,
            center.x + delta_lng,
            center.y + delta_lat,
        )
    }

    /// True when `other` lies entirely within `self` (edges inclusive).
    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// True when the two boxes overlap or touch.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn center(&self) -> Position {
        Position::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

// --- Polygons ---

/// Drops the closing vertex of a ring if it repeats the first one.
pub fn open_ring(ring: &[Position]) -> &[Position] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// True when `point` lies on the segment `a`-`b` (within a small tolerance).
pub fn point_on_segment(point: &Position, a: &Position, b: &Position) -> bool {
    let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
    let scale = (b - a).norm().max(1.0);
    if cross.abs() > EPSILON * scale {
        return false;
    }
    point.x >= a.x.min(b.x) - EPSILON
        && point.x <= a.x.max(b.x) + EPSILON
        && point.y >= a.y.min(b.y) - EPSILON
        && point.y <= a.y.max(b.y) + EPSILON
}

/// Point-in-polygon test by ray casting. Points on the boundary count as
/// inside. The ring may be open or closed.
pub fn point_in_polygon(point: &Position, ring: &[Position]) -> bool {
    let ring = open_ring(ring);
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = &ring[i];
        let pj = &ring[j];

        if point_on_segment(point, pj, pi) {
            return true;
        }

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// True when every turn of the ring has the same orientation.
///
/// Collinear vertices are ignored.
pub fn is_convex(ring: &[Position]) -> bool {
    let ring = open_ring(ring);
    let n = ring.len();
    if n < 4 {
        return true;
    }

    let mut sign = 0.0_f64;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        let c = &ring[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() <= EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// True when the ring has 5 coordinates spanning exactly two distinct x and
/// two distinct y values, i.e. a closed axis-aligned rectangle.
pub fn is_axis_aligned_rectangle(ring: &[Position]) -> bool {
    if ring.len() != 5 {
        return false;
    }
    let mut xs: Vec<f64> = ring.iter().map(|p| p.x).collect();
    let mut ys: Vec<f64> = ring.iter().map(|p| p.y).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    ys.sort_by(f64::total_cmp);
    ys.dedup();
    xs.len() == 2 && ys.len() == 2
}

/// Exact test that the whole segment `a`-`b` lies inside the polygon
/// (boundary inclusive), valid for concave rings.
///
/// Endpoints are checked first. The segment is then cut at every crossing
/// or touching point with a ring edge; each resulting piece lies entirely on
/// one side of the boundary, so testing the midpoint of each piece decides
/// the whole segment.
///
/// A segment lying along a ring edge counts as contained, so links traced
/// on the outline of a concave area are selected with it.
pub fn segment_in_polygon(a: &Position, b: &Position, ring: &[Position]) -> bool {
    if !point_in_polygon(a, ring) || !point_in_polygon(b, ring) {
        return false;
    }

    let ring = open_ring(ring);
    let n = ring.len();
    let d = b - a;
    let length_sq = d.norm_squared();
    if length_sq <= EPSILON * EPSILON {
        return true;
    }

    let mut cuts = vec![0.0, 1.0];
    for i in 0..n {
        let p = &ring[i];
        let q = &ring[(i + 1) % n];
        let e = q - p;
        let denom = d.x * e.y - d.y * e.x;
        if denom.abs() > EPSILON {
            let w = p - a;
            let t = (w.x * e.y - w.y * e.x) / denom;
            let u = (w.x * d.y - w.y * d.x) / denom;
            if (-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u) {
                cuts.push(t.clamp(0.0, 1.0));
            }
        } else {
            // Parallel edge: its endpoints become cuts where they lie on the segment.
            for v in [p, q] {
                if point_on_segment(v, a, b) {
                    cuts.push(((v - a).dot(&d) / length_sq).clamp(0.0, 1.0));
                }
            }
        }
    }

    cuts.sort_by(f64::total_cmp);
    cuts.dedup_by(|x, y| (*x - *y).abs() <= EPSILON);

    cuts.windows(2).all(|w| {
        let mid = a + d * ((w[0] + w[1]) / 2.0);
        point_in_polygon(&mid, ring)
    })
}

// --- Distances ---

/// Great-circle distance in meters between two longitude/latitude positions.
pub fn haversine_distance(a: &Position, b: &Position) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Closest point on the segment `a`-`b` to `point`, with its distance in
/// meters.
///
/// The projection is computed in a local equirectangular frame centered on
/// `point`, which is accurate at the short ranges used for snapping.
pub fn nearest_point_on_segment(point: &Position, a: &Position, b: &Position) -> (Position, f64) {
    let k = point.y.to_radians().cos();
    let to_local = |p: &Position| nalgebra::Vector2::new((p.x - point.x) * k, p.y - point.y);

    let la = to_local(a);
    let lb = to_local(b);
    let d = lb - la;
    let length_sq = d.norm_squared();
    let t = if length_sq <= EPSILON * EPSILON {
        0.0
    } else {
        (-la.dot(&d) / length_sq).clamp(0.0, 1.0)
    };

    let snap = a + (b - a) * t;
    (snap, haversine_distance(point, &snap))
}
