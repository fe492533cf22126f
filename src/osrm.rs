//! OSRM HTTP adapter for turn-by-turn routes.

use std::collections::BTreeSet;
use std::env;

use serde::Deserialize;
use tracing::debug;

use crate::error::NavError;
use crate::polyline::Polyline;
use crate::route::{Lane, LaneIndication, LonLat, ManeuverType, Route, RouteSource, RouteStep};
use crate::traits::{RouteProvider, RouteRequest};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

impl OsrmConfig {
    /// Defaults overridden by `OSRM_BASE_URL`, `OSRM_PROFILE` and
    /// `OSRM_TIMEOUT_SECS` when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("OSRM_BASE_URL").unwrap_or(defaults.base_url),
            profile: env::var("OSRM_PROFILE").unwrap_or(defaults.profile),
            timeout_secs: env::var("OSRM_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn route_url(&self, request: &RouteRequest) -> String {
        let mut url = format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}?steps=true&geometries=geojson&overview=full&alternatives=false",
            self.config.base_url,
            self.config.profile,
            request.origin.lon(),
            request.origin.lat(),
            request.destination.lon(),
            request.destination.lat(),
        );
        if request.options.avoid_highways {
            url.push_str("&exclude=motorway");
        }
        url
    }
}

impl RouteProvider for OsrmClient {
    fn route(&self, request: &RouteRequest) -> Result<Route, NavError> {
        let url = self.route_url(request);
        debug!(%url, route_type = ?request.options.route_type, "requesting OSRM route");

        let body = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())?;

        parse_route_response(&body)
    }
}

/// Convert an OSRM `route` service response body into a [`Route`].
///
/// The first route is used. Route totals are the sums of the step values so
/// that they always agree with the steps.
pub fn parse_route_response(body: &str) -> Result<Route, NavError> {
    let response: OsrmRouteResponse = serde_json::from_str(body)
        .map_err(|err| NavError::RoutingProvider(format!("malformed OSRM response: {}", err)))?;

    if response.code != "Ok" {
        return Err(NavError::RoutingProvider(format!(
            "OSRM returned {}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| NavError::RoutingProvider("OSRM returned no routes".to_string()))?;

    let steps: Vec<RouteStep> = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .enumerate()
        .map(|(index, step)| step.into_route_step(index))
        .collect();

    let geometry = Polyline::new(
        route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| LonLat(lon, lat))
            .collect(),
    );

    let id = match (geometry.points().first(), geometry.points().last()) {
        (Some(first), Some(last)) => format!(
            "osrm-{:.5},{:.5}-{:.5},{:.5}",
            first.lon(),
            first.lat(),
            last.lon(),
            last.lat()
        ),
        _ => "osrm-route".to_string(),
    };

    Ok(Route {
        id,
        distance_meters: steps.iter().map(|s| s.distance_meters).sum(),
        duration_seconds: steps.iter().map(|s| s.duration_seconds).sum(),
        steps,
        geometry,
        traffic_delay_seconds: 0.0,
        source: RouteSource::Provider,
    })
}

fn maneuver_type(kind: &str, modifier: Option<&str>) -> ManeuverType {
    let modifier = modifier.unwrap_or("straight");
    match kind {
        "arrive" => ManeuverType::Arrive,
        "merge" => ManeuverType::Merge,
        "roundabout" | "rotary" | "roundabout turn" | "exit roundabout" | "exit rotary" => {
            ManeuverType::Roundabout
        }
        "fork" if modifier.contains("left") => ManeuverType::ForkLeft,
        "fork" => ManeuverType::ForkRight,
        _ if modifier == "uturn" => ManeuverType::UTurn,
        _ if modifier.contains("left") => ManeuverType::TurnLeft,
        _ if modifier.contains("right") => ManeuverType::TurnRight,
        _ => ManeuverType::Straight,
    }
}

fn instruction(kind: &str, maneuver: ManeuverType, street: &str) -> String {
    let onto = if street.is_empty() {
        String::new()
    } else {
        format!(" onto {}", street)
    };

    match (kind, maneuver) {
        ("depart", _) if street.is_empty() => "Start driving".to_string(),
        ("depart", _) => format!("Head along {}", street),
        (_, ManeuverType::Arrive) => "Arrive at your destination".to_string(),
        (_, ManeuverType::Roundabout) => format!("Enter the roundabout and exit{}", onto),
        (_, ManeuverType::Merge) => format!("Merge{}", onto),
        (_, ManeuverType::ForkLeft) => format!("Keep left at the fork{}", onto),
        (_, ManeuverType::ForkRight) => format!("Keep right at the fork{}", onto),
        (_, ManeuverType::UTurn) => "Make a U-turn".to_string(),
        (_, ManeuverType::TurnLeft) => format!("Turn left{}", onto),
        (_, ManeuverType::TurnRight) => format!("Turn right{}", onto),
        (_, ManeuverType::Straight) => format!("Continue{}", onto),
    }
}

fn lane_indications(raw: &[String]) -> BTreeSet<LaneIndication> {
    raw.iter()
        .filter_map(|indication| match indication.as_str() {
            "straight" => Some(LaneIndication::Straight),
            value if value.contains("left") => Some(LaneIndication::Left),
            value if value.contains("right") => Some(LaneIndication::Right),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
    #[serde(default)]
    intersections: Vec<OsrmIntersection>,
}

impl OsrmStep {
    fn into_route_step(self, index: usize) -> RouteStep {
        let maneuver = maneuver_type(&self.maneuver.kind, self.maneuver.modifier.as_deref());
        let [lon, lat] = self.maneuver.location;
        let lane_guidance = self
            .intersections
            .into_iter()
            .next()
            .and_then(|intersection| intersection.lanes)
            .map(|lanes| {
                lanes
                    .into_iter()
                    .map(|lane| Lane {
                        valid: lane.valid,
                        indications: lane_indications(&lane.indications),
                    })
                    .collect()
            });

        RouteStep {
            id: format!("step-{}", index),
            instruction: instruction(&self.maneuver.kind, maneuver, &self.name),
            distance_meters: self.distance,
            duration_seconds: self.duration,
            maneuver_type: maneuver,
            street_name: self.name,
            coordinates: LonLat(lon, lat),
            speed_limit: None,
            lane_guidance,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    location: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct OsrmIntersection {
    #[serde(default)]
    lanes: Option<Vec<OsrmLane>>,
}

#[derive(Debug, Deserialize)]
struct OsrmLane {
    valid: bool,
    #[serde(default)]
    indications: Vec<String>,
}
