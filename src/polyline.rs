//! Polyline representation for route geometries.
//!
//! Route geometry is kept as decoded `(lon, lat)` points. It is a display
//! approximation of the route and is independent of the maneuver steps.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_m;
use crate::route::LonLat;

/// A route geometry as decoded coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polyline {
    points: Vec<LonLat>,
}

impl Polyline {
    pub fn new(points: Vec<LonLat>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[LonLat] {
        &self.points
    }

    pub fn into_points(self) -> Vec<LonLat> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distance in meters from `position` to the closest vertex.
    ///
    /// Segment interiors are not considered, so a position beside the middle
    /// of a long straight segment reads farther away than it is. Returns
    /// `None` for an empty polyline.
    pub fn nearest_vertex_distance_m(&self, position: LonLat) -> Option<f64> {
        self.points
            .iter()
            .map(|vertex| haversine_m(position, *vertex))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Distance in meters from `position` to the closest point on any
    /// segment. A single-point polyline behaves like its vertex.
    pub fn distance_to_m(&self, position: LonLat) -> Option<f64> {
        if self.points.len() < 2 {
            return self.nearest_vertex_distance_m(position);
        }
        self.points
            .windows(2)
            .map(|segment| haversine_m(position, project_on_segment(position, segment[0], segment[1])))
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Closest point to `p` on segment `a`-`b`.
///
/// Planar approximation with longitude scaled by the cosine of the mean
/// latitude; good enough for street-length segments.
fn project_on_segment(p: LonLat, a: LonLat, b: LonLat) -> LonLat {
    let cos_lat = ((a.lat() + b.lat()) / 2.0).to_radians().cos();

    let dx = (b.lon() - a.lon()) * cos_lat;
    let dy = b.lat() - a.lat();
    let px = (p.lon() - a.lon()) * cos_lat;
    let py = p.lat() - a.lat();

    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 1e-20 {
        return a;
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);
    a.lerp(b, t)
}
