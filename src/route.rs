//! Route data contracts.
//!
//! These types mirror what a routing provider returns: an ordered list of
//! maneuver steps plus aggregate totals and a display polyline. They carry
//! no behavior beyond [`validate_route`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::NavError;
use crate::polyline::Polyline;

/// Allowed difference between route totals and the sum of their steps.
pub const ROUTE_TOTAL_TOLERANCE: f64 = 1.0;

/// A `(longitude, latitude)` pair in degrees.
///
/// Serializes as a two-element JSON array, matching GeoJSON ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat(pub f64, pub f64);

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self(lon, lat)
    }

    pub fn lon(&self) -> f64 {
        self.0
    }

    pub fn lat(&self) -> f64 {
        self.1
    }

    /// Linear interpolation in lon/lat space (not geodesic).
    pub fn lerp(&self, to: LonLat, t: f64) -> LonLat {
        LonLat(self.0 * (1.0 - t) + to.0 * t, self.1 * (1.0 - t) + to.1 * t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManeuverType {
    Straight,
    TurnLeft,
    TurnRight,
    Merge,
    Roundabout,
    Arrive,
    UTurn,
    ForkLeft,
    ForkRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaneIndication {
    Straight,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    /// Whether this lane can be used for the upcoming maneuver.
    pub valid: bool,
    pub indications: BTreeSet<LaneIndication>,
}

/// One maneuver segment of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    pub id: String,
    pub instruction: String,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub maneuver_type: ManeuverType,
    #[serde(default)]
    pub street_name: String,
    /// Location of this step's maneuver.
    pub coordinates: LonLat,
    /// Posted speed limit in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane_guidance: Option<Vec<Lane>>,
}

/// Where a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteSource {
    #[default]
    Provider,
    /// Locally synthesized straight-line estimate.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub steps: Vec<RouteStep>,
    pub geometry: Polyline,
    #[serde(default)]
    pub traffic_delay_seconds: f64,
    #[serde(default)]
    pub source: RouteSource,
}

impl Route {
    pub fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == RouteSource::Fallback
    }

    /// Distance of the steps from `index` to the end of the route.
    pub fn distance_from(&self, index: usize) -> f64 {
        self.steps
            .iter()
            .skip(index)
            .map(|step| step.distance_meters)
            .sum()
    }

    /// Duration of the steps from `index` to the end of the route.
    pub fn duration_from(&self, index: usize) -> f64 {
        self.steps
            .iter()
            .skip(index)
            .map(|step| step.duration_seconds)
            .sum()
    }
}

/// Check the structural invariants of a route.
///
/// Steps must be non-empty and end with an `arrive` maneuver, step ids must
/// be unique, distances and durations must be finite and non-negative, and
/// route totals must match the step sums within [`ROUTE_TOTAL_TOLERANCE`].
pub fn validate_route(route: &Route) -> Result<(), NavError> {
    let Some(last) = route.steps.last() else {
        return Err(NavError::InvalidRoute(format!("route {} has no steps", route.id)));
    };

    if last.maneuver_type != ManeuverType::Arrive {
        return Err(NavError::InvalidRoute(format!(
            "route {} does not end with an arrive step",
            route.id
        )));
    }

    let mut ids = HashSet::with_capacity(route.steps.len());
    for step in &route.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(NavError::InvalidRoute(format!("duplicate step id {}", step.id)));
        }
        if !is_non_negative(step.distance_meters) || !is_non_negative(step.duration_seconds) {
            return Err(NavError::InvalidRoute(format!(
                "step {} has negative distance or duration",
                step.id
            )));
        }
        if step.speed_limit.is_some_and(|limit| !is_non_negative(limit)) {
            return Err(NavError::InvalidRoute(format!("step {} has a negative speed limit", step.id)));
        }
    }

    if !is_non_negative(route.traffic_delay_seconds) {
        return Err(NavError::InvalidRoute(format!(
            "route {} has a negative traffic delay",
            route.id
        )));
    }

    let step_distance = route.distance_from(0);
    if (step_distance - route.distance_meters).abs() > ROUTE_TOTAL_TOLERANCE {
        return Err(NavError::InvalidRoute(format!(
            "route distance {} does not match step sum {}",
            route.distance_meters, step_distance
        )));
    }

    let step_duration = route.duration_from(0);
    if (step_duration - route.duration_seconds).abs() > ROUTE_TOTAL_TOLERANCE {
        return Err(NavError::InvalidRoute(format!(
            "route duration {} does not match step sum {}",
            route.duration_seconds, step_duration
        )));
    }

    Ok(())
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
