//! Seams between the navigation core and its collaborators.
//!
//! The core never talks to a network, a GPS chip, device storage or the
//! wall clock directly. Applications (and tests) implement these traits and
//! hand instances to the components that need them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NavError, PositionError};
use crate::location::LocationSample;
use crate::route::{LonLat, Route};
use crate::settings::{NavigationSettings, RoutePreference};

/// Provider-side optimisation goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteType {
    #[default]
    Fastest,
    Shortest,
    Eco,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOptions {
    #[serde(default)]
    pub avoid_traffic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_type: Option<RouteType>,
    #[serde(default)]
    pub avoid_highways: bool,
}

impl RouteOptions {
    /// Options matching a user's stored route preference.
    pub fn from_preference(preference: RoutePreference) -> Self {
        let (route_type, avoid_highways) = match preference {
            RoutePreference::Fastest => (RouteType::Fastest, false),
            RoutePreference::Shortest => (RouteType::Shortest, false),
            RoutePreference::Eco => (RouteType::Eco, false),
            RoutePreference::AvoidHighways => (RouteType::Fastest, true),
        };
        Self {
            avoid_traffic: false,
            route_type: Some(route_type),
            avoid_highways,
        }
    }
}

/// Request handed to a routing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: LonLat,
    pub destination: LonLat,
    #[serde(default)]
    pub options: RouteOptions,
}

/// External routing service producing a route for a request.
///
/// Implementations may block on I/O; callers bound the wait.
pub trait RouteProvider: Send + Sync {
    fn route(&self, request: &RouteRequest) -> Result<Route, NavError>;
}

/// Identifier of an active position watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Options passed to the platform when starting a position watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Maximum wait for the first fix.
    pub timeout: Duration,
    /// Maximum age of a cached fix the platform may return.
    pub maximum_age: Duration,
}

/// Receives every position update or error from a watch.
pub type PositionSink = Box<dyn Fn(Result<LocationSample, PositionError>) + Send + Sync>;

/// Platform geolocation API.
pub trait PositionSource: Send + Sync {
    /// Last fix the platform has cached, if any.
    fn current_fix(&self) -> Option<LocationSample>;

    /// Begin pushing updates into `sink` until [`PositionSource::clear_watch`].
    fn watch(&self, options: WatchOptions, sink: PositionSink) -> Result<WatchId, PositionError>;

    fn clear_watch(&self, id: WatchId);
}

/// Durable key-value storage for navigation settings.
pub trait SettingsBackend: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<NavigationSettings>, NavError>;

    fn save(&self, settings: &NavigationSettings) -> Result<(), NavError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
