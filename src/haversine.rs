//! Haversine route generator (fallback when the routing provider is unavailable).
//!
//! Uses great-circle distance between origin and destination to synthesize a
//! three-step straight-line route. Much less accurate than a real provider
//! (ignores roads) but always available and fully deterministic.

use tracing::debug;

use crate::error::NavError;
use crate::polyline::Polyline;
use crate::route::{LonLat, ManeuverType, Route, RouteSource, RouteStep};
use crate::traits::{RouteProvider, RouteRequest};

/// Average speed assumed for fallback routes.
const DEFAULT_SPEED_KMH: f64 = 30.0;

/// Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const MIN_DISTANCE_M: f64 = 500.0;
const MAX_DISTANCE_M: f64 = 10_000.0;
const MIN_DURATION_S: f64 = 60.0;
const MAX_DURATION_S: f64 = 1_800.0;

/// Share of the total and position along the line for each synthesized step.
const STEP_PLAN: [(f64, f64, ManeuverType, &str); 3] = [
    (0.4, 0.4, ManeuverType::Straight, "Head toward destination"),
    (0.4, 0.8, ManeuverType::Straight, "Continue straight"),
    (0.2, 1.0, ManeuverType::Arrive, "Arrive at your destination"),
];

/// Share of the duration reported as traffic delay unless traffic is avoided.
const TRAFFIC_DELAY_SHARE: f64 = 0.1;

/// Great-circle distance between two points in meters.
pub fn haversine_m(from: LonLat, to: LonLat) -> f64 {
    let lat1_rad = from.lat().to_radians();
    let lat2_rad = to.lat().to_radians();
    let delta_lat = (to.lat() - from.lat()).to_radians();
    let delta_lng = (to.lon() - from.lon()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Clamped distance and duration a fallback route is built from, before the
/// per-step split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackEstimate {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Deterministic straight-line route generator.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for FallbackRouter {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl FallbackRouter {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Distance clamped into [500, 10000] m and the travel time for the
    /// unclamped great-circle distance, clamped into [60, 1800] s.
    pub fn estimate(&self, origin: LonLat, destination: LonLat) -> FallbackEstimate {
        let distance = haversine_m(origin, destination);
        FallbackEstimate {
            distance_meters: distance.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M),
            duration_seconds: self.meters_to_seconds(distance).clamp(MIN_DURATION_S, MAX_DURATION_S),
        }
    }

    fn meters_to_seconds(&self, meters: f64) -> f64 {
        let meters_per_second = self.speed_kmh * 1000.0 / 3600.0;
        meters / meters_per_second
    }

    pub fn generate(&self, request: &RouteRequest) -> Route {
        let RouteRequest {
            origin,
            destination,
            options,
        } = *request;
        let estimate = self.estimate(origin, destination);

        let steps: Vec<RouteStep> = STEP_PLAN
            .iter()
            .enumerate()
            .map(|(i, (share, progress, maneuver, instruction))| RouteStep {
                id: format!("fallback-step-{}", i + 1),
                instruction: instruction.to_string(),
                distance_meters: (estimate.distance_meters * share).round(),
                duration_seconds: (estimate.duration_seconds * share).round(),
                maneuver_type: *maneuver,
                street_name: String::new(),
                coordinates: origin.lerp(destination, *progress),
                speed_limit: None,
                lane_guidance: None,
            })
            .collect();

        // Per-step rounding means the totals must be re-summed.
        let distance_meters: f64 = steps.iter().map(|s| s.distance_meters).sum();
        let duration_seconds: f64 = steps.iter().map(|s| s.duration_seconds).sum();
        let traffic_delay_seconds = if options.avoid_traffic {
            0.0
        } else {
            (duration_seconds * TRAFFIC_DELAY_SHARE).round()
        };

        let geometry = Polyline::new(vec![
            origin,
            origin.lerp(destination, 1.0 / 3.0),
            origin.lerp(destination, 2.0 / 3.0),
            destination,
        ]);

        debug!(distance_meters, duration_seconds, "generated fallback route");

        Route {
            id: format!(
                "fallback-{:.5},{:.5}-{:.5},{:.5}",
                origin.lon(),
                origin.lat(),
                destination.lon(),
                destination.lat()
            ),
            distance_meters,
            duration_seconds,
            steps,
            geometry,
            traffic_delay_seconds,
            source: RouteSource::Fallback,
        }
    }
}

impl RouteProvider for FallbackRouter {
    fn route(&self, request: &RouteRequest) -> Result<Route, NavError> {
        Ok(self.generate(request))
    }
}
