//! UI-facing projection of a navigation snapshot.
//!
//! The presenter turns raw session numbers into display strings in the
//! user's units and collects the alerts the UI should surface. It holds no
//! state of its own beyond a reference to the settings store and the UTC
//! offset arrival times are shown in.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use serde::Serialize;

use crate::haversine::haversine_m;
use crate::route::{Lane, ManeuverType};
use crate::session::{GpsSignalStrength, NavigationSnapshot};
use crate::settings::{SettingsStore, Units};

const FEET_PER_METER: f64 = 3.280_84;
const METERS_PER_MILE: f64 = 1_609.344;
const MPH_PER_KMH: f64 = 0.621_371;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationAlert {
    Recalculating,
    OffRoute,
    GpsLost,
    GpsWeak,
    /// The active route is a straight-line estimate.
    EstimatedRoute,
    LastMileWalking,
    ArrivalReady,
}

impl NavigationAlert {
    pub fn message(&self) -> &'static str {
        match self {
            NavigationAlert::Recalculating => "Recalculating route",
            NavigationAlert::OffRoute => "You are off route",
            NavigationAlert::GpsLost => "GPS signal lost",
            NavigationAlert::GpsWeak => "Weak GPS signal",
            NavigationAlert::EstimatedRoute => "Showing an estimated route",
            NavigationAlert::LastMileWalking => "Almost there, consider walking the rest",
            NavigationAlert::ArrivalReady => "You have arrived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationView {
    pub active: bool,
    pub instruction: Option<String>,
    pub street_name: Option<String>,
    pub maneuver: Option<ManeuverType>,
    pub distance_to_maneuver: Option<String>,
    pub remaining_distance: String,
    pub remaining_time: String,
    /// Arrival time as `HH:MM` in the presenter's offset.
    pub eta: Option<String>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub speed_limit: Option<String>,
    pub lanes: Option<Vec<Lane>>,
    pub voice_prompt: Option<String>,
    pub alerts: Vec<NavigationAlert>,
    pub can_confirm_arrival: bool,
}

pub struct NavigationPresenter {
    settings: Arc<SettingsStore>,
    utc_offset: FixedOffset,
}

impl NavigationPresenter {
    /// Presenter showing times in the system's current local offset.
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            utc_offset: Local::now().offset().fix(),
        }
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn present(&self, snapshot: &NavigationSnapshot) -> NavigationView {
        let settings = self.settings.get();
        let units = settings.units;

        // The step being driven ends at the next step's maneuver point.
        let upcoming = snapshot.next_step.as_ref().or_else(|| snapshot.current_step());
        let distance_to_maneuver_m = upcoming.map(|step| match &snapshot.user_location {
            Some(location) if !location.synthetic => haversine_m(location.position(), step.coordinates),
            _ => snapshot
                .current_step()
                .map(|current| current.distance_meters)
                .unwrap_or(step.distance_meters),
        });

        let distance_to_maneuver = distance_to_maneuver_m.map(|m| format_distance(m, units));
        let voice_prompt = match (upcoming, &distance_to_maneuver) {
            (Some(step), Some(distance)) if settings.voice_guidance && snapshot.is_active => {
                Some(format!("In {}, {}", distance, lowercase_first(&step.instruction)))
            }
            _ => None,
        };

        NavigationView {
            active: snapshot.is_active,
            instruction: upcoming.map(|step| step.instruction.clone()),
            street_name: upcoming
                .map(|step| step.street_name.clone())
                .filter(|name| !name.is_empty()),
            maneuver: upcoming.map(|step| step.maneuver_type),
            distance_to_maneuver,
            remaining_distance: format_distance(snapshot.remaining_distance_meters, units),
            remaining_time: format_duration(snapshot.remaining_time_seconds),
            eta: snapshot
                .eta
                .map(|eta| eta.with_timezone(&self.utc_offset).format("%H:%M").to_string()),
            arrival_time: snapshot.eta,
            speed_limit: snapshot
                .current_step()
                .and_then(|step| step.speed_limit)
                .filter(|_| settings.show_speed_limits)
                .map(|kmh| format_speed(kmh, units)),
            lanes: upcoming
                .and_then(|step| step.lane_guidance.clone())
                .filter(|_| settings.show_lane_guidance),
            voice_prompt,
            alerts: alerts(snapshot),
            can_confirm_arrival: snapshot.can_confirm_arrival,
        }
    }
}

fn alerts(snapshot: &NavigationSnapshot) -> Vec<NavigationAlert> {
    let mut alerts = Vec::new();
    if snapshot.is_recalculating {
        alerts.push(NavigationAlert::Recalculating);
    } else if snapshot.is_off_route {
        alerts.push(NavigationAlert::OffRoute);
    }
    match snapshot.gps_signal_strength {
        GpsSignalStrength::Lost => alerts.push(NavigationAlert::GpsLost),
        GpsSignalStrength::Weak => alerts.push(NavigationAlert::GpsWeak),
        GpsSignalStrength::Strong => {}
    }
    if snapshot.route.as_ref().is_some_and(|route| route.is_fallback()) {
        alerts.push(NavigationAlert::EstimatedRoute);
    }
    if snapshot.last_mile_walking {
        alerts.push(NavigationAlert::LastMileWalking);
    }
    if snapshot.can_confirm_arrival {
        alerts.push(NavigationAlert::ArrivalReady);
    }
    alerts
}

pub fn format_distance(meters: f64, units: Units) -> String {
    match units {
        Units::Metric if meters >= 1000.0 => format!("{:.1} km", meters / 1000.0),
        Units::Metric => format!("{} m", round_to_ten(meters)),
        Units::Imperial => {
            let miles = meters / METERS_PER_MILE;
            if miles >= 0.1 {
                format!("{:.1} mi", miles)
            } else {
                format!("{} ft", round_to_ten(meters * FEET_PER_METER))
            }
        }
    }
}

pub fn format_duration(seconds: f64) -> String {
    let minutes = (seconds / 60.0).round() as i64;
    if minutes < 1 {
        "< 1 min".to_string()
    } else if minutes < 60 {
        format!("{} min", minutes)
    } else {
        format!("{} h {} min", minutes / 60, minutes % 60)
    }
}

pub fn format_speed(kmh: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{} km/h", kmh.round() as i64),
        Units::Imperial => format!("{} mph", (kmh * MPH_PER_KMH).round() as i64),
    }
}

fn round_to_ten(value: f64) -> i64 {
    (value / 10.0).round() as i64 * 10
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
