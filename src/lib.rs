//! parking-nav core
//!
//! Client-side turn-by-turn navigation: route contracts, a routing client
//! with a deterministic offline fallback, location tracking, the navigation
//! session state machine, durable settings and a presenter for the UI.

pub mod error;
pub mod haversine;
pub mod location;
pub mod osrm;
pub mod polyline;
pub mod presenter;
pub mod route;
pub mod routing;
pub mod session;
pub mod settings;
pub mod traits;

pub use error::{NavError, PositionError, PositionErrorCode};
pub use location::{LocationSample, LocationTracker, TrackerConfig};
pub use route::{LonLat, ManeuverType, Route, RouteStep, validate_route};
pub use routing::{RoutingClient, RoutingConfig};
pub use session::{Destination, GpsSignalStrength, NavigationPhase, NavigationSession, NavigationSnapshot, SessionConfig};
pub use settings::{NavigationSettings, SettingsPatch, SettingsStore};
