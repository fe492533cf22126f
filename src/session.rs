//! Turn-by-turn navigation session.
//!
//! A [`NavigationSession`] owns the active route and everything derived from
//! it: current step, remaining distance and time, ETA, off-route state and
//! the recalculation lifecycle. It is a cheap cloneable handle; all clones
//! share one state guarded by a single mutex, so transitions coming from the
//! location tracker, the UI and background recalculation are serialized.
//!
//! ```text
//! Idle --start--> OnRoute --off route--> OffRoute --> Recalculating --> OnRoute
//!                 OnRoute --final step, < 50 m--> Arriving --confirm--> Idle
//! any --stop--> Idle
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{NavError, PositionError};
use crate::haversine::haversine_m;
use crate::location::{LocationSample, LocationTracker};
use crate::route::{LonLat, ManeuverType, Route, RouteStep, validate_route};
use crate::routing::RoutingClient;
use crate::settings::SettingsStore;
use crate::traits::{Clock, RouteOptions, SystemClock};

/// Where the user is headed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,
}

impl Destination {
    pub fn new(name: impl Into<String>, position: LonLat) -> Self {
        Self {
            latitude: position.lat(),
            longitude: position.lon(),
            name: name.into(),
            spot_id: None,
        }
    }

    pub fn with_spot(mut self, spot_id: impl Into<String>) -> Self {
        self.spot_id = Some(spot_id.into());
        self
    }

    pub fn position(&self) -> LonLat {
        LonLat(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpsSignalStrength {
    Strong,
    Weak,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPhase {
    Idle,
    OnRoute,
    OffRoute,
    Recalculating,
    Arriving,
}

/// How off-route distance is measured against the route geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffRouteMetric {
    /// Closest point on any geometry segment.
    #[default]
    Segment,
    /// Closest geometry vertex only.
    Vertex,
}

/// Where recalculation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecalculationMode {
    /// On a dedicated thread; samples arriving meanwhile are buffered.
    #[default]
    Background,
    /// On the thread that detected the off-route sample.
    Inline,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub off_route_threshold_m: f64,
    pub off_route_metric: OffRouteMetric,
    /// Distance to the next maneuver point at which the step advances.
    pub maneuver_tolerance_m: f64,
    /// Remaining distance on the final step below which arrival can be confirmed.
    pub arrival_distance_m: f64,
    pub walking_threshold_m: f64,
    /// Without a sample for this long the GPS signal is considered lost.
    pub signal_timeout: Duration,
    /// Reported accuracy radius above which a sample counts as weak.
    pub weak_accuracy_m: f64,
    pub recalculation: RecalculationMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 50.0,
            off_route_metric: OffRouteMetric::Segment,
            maneuver_tolerance_m: 30.0,
            arrival_distance_m: 50.0,
            walking_threshold_m: 100.0,
            signal_timeout: Duration::from_secs(15),
            weak_accuracy_m: 30.0,
            recalculation: RecalculationMode::Background,
        }
    }
}

/// Read-only view of the session after a transition.
#[derive(Debug, Clone)]
pub struct NavigationSnapshot {
    pub is_active: bool,
    pub route: Option<Arc<Route>>,
    pub current_step_index: usize,
    pub destination: Option<Destination>,
    pub user_location: Option<LocationSample>,
    pub eta: Option<DateTime<Utc>>,
    pub remaining_distance_meters: f64,
    pub remaining_time_seconds: f64,
    pub is_off_route: bool,
    pub is_recalculating: bool,
    pub gps_signal_strength: GpsSignalStrength,
    pub last_mile_walking: bool,
    pub next_step: Option<RouteStep>,
    pub can_confirm_arrival: bool,
    pub phase: NavigationPhase,
}

impl NavigationSnapshot {
    pub fn current_step(&self) -> Option<&RouteStep> {
        self.route
            .as_ref()
            .and_then(|route| route.steps.get(self.current_step_index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&NavigationSnapshot) + Send + Sync>;

/// A recalculation request captured under the state lock.
#[derive(Debug, Clone, Copy)]
struct RecalcJob {
    ticket: u64,
    origin: LonLat,
    destination: LonLat,
    options: RouteOptions,
}

#[derive(Debug)]
struct SessionState {
    is_active: bool,
    route: Option<Arc<Route>>,
    current_step_index: usize,
    destination: Option<Destination>,
    user_location: Option<LocationSample>,
    eta: Option<DateTime<Utc>>,
    remaining_distance_meters: f64,
    remaining_time_seconds: f64,
    is_off_route: bool,
    is_recalculating: bool,
    gps_signal_strength: GpsSignalStrength,
    last_mile_walking: bool,
    last_sample_at: Option<DateTime<Utc>>,
    route_options: RouteOptions,
    /// Latest sample received while recalculating.
    pending_sample: Option<LocationSample>,
    /// Bumped whenever the session is torn down; recalculation results
    /// carrying an older ticket are discarded.
    ticket: u64,
    in_flight: usize,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_active: false,
            route: None,
            current_step_index: 0,
            destination: None,
            user_location: None,
            eta: None,
            remaining_distance_meters: 0.0,
            remaining_time_seconds: 0.0,
            is_off_route: false,
            is_recalculating: false,
            gps_signal_strength: GpsSignalStrength::Lost,
            last_mile_walking: false,
            last_sample_at: None,
            route_options: RouteOptions::default(),
            pending_sample: None,
            ticket: 0,
            in_flight: 0,
        }
    }
}

impl SessionState {
    fn can_confirm_arrival(&self, config: &SessionConfig) -> bool {
        match &self.route {
            Some(route) if self.is_active => {
                self.current_step_index == route.last_step_index()
                    && self.remaining_distance_meters < config.arrival_distance_m
            }
            _ => false,
        }
    }

    fn phase(&self, config: &SessionConfig) -> NavigationPhase {
        if !self.is_active {
            NavigationPhase::Idle
        } else if self.is_recalculating {
            NavigationPhase::Recalculating
        } else if self.is_off_route {
            NavigationPhase::OffRoute
        } else if self.can_confirm_arrival(config) {
            NavigationPhase::Arriving
        } else {
            NavigationPhase::OnRoute
        }
    }

    fn snapshot(&self, config: &SessionConfig) -> NavigationSnapshot {
        NavigationSnapshot {
            is_active: self.is_active,
            route: self.route.clone(),
            current_step_index: self.current_step_index,
            destination: self.destination.clone(),
            user_location: self.user_location.clone(),
            eta: self.eta,
            remaining_distance_meters: self.remaining_distance_meters,
            remaining_time_seconds: self.remaining_time_seconds,
            is_off_route: self.is_off_route,
            is_recalculating: self.is_recalculating,
            gps_signal_strength: self.gps_signal_strength,
            last_mile_walking: self.last_mile_walking,
            next_step: self
                .route
                .as_ref()
                .and_then(|route| route.steps.get(self.current_step_index + 1))
                .cloned(),
            can_confirm_arrival: self.can_confirm_arrival(config),
            phase: self.phase(config),
        }
    }

    fn install_route(&mut self, route: Arc<Route>, eta: DateTime<Utc>) {
        self.current_step_index = 0;
        self.remaining_distance_meters = route.distance_from(0);
        self.remaining_time_seconds = route.duration_from(0);
        self.eta = Some(eta);
        self.is_off_route = false;
        self.last_mile_walking = false;
        self.route = Some(route);
    }

    /// Drop everything tied to the route. Location and signal survive since
    /// they describe the device, not the trip.
    fn clear(&mut self) {
        self.is_active = false;
        self.route = None;
        self.current_step_index = 0;
        self.destination = None;
        self.eta = None;
        self.remaining_distance_meters = 0.0;
        self.remaining_time_seconds = 0.0;
        self.is_off_route = false;
        self.is_recalculating = false;
        self.last_mile_walking = false;
        self.pending_sample = None;
        self.ticket = self.ticket.wrapping_add(1);
    }

    fn apply_sample(
        &mut self,
        sample: LocationSample,
        now: DateTime<Utc>,
        config: &SessionConfig,
        notices: &mut Vec<NavigationSnapshot>,
    ) -> Option<RecalcJob> {
        let sample = sample.normalized();
        if !sample.synthetic {
            self.last_sample_at = Some(now);
        }
        self.gps_signal_strength = classify_signal(&sample, config);
        self.user_location = Some(sample.clone());

        if !self.is_active || sample.synthetic {
            notices.push(self.snapshot(config));
            return None;
        }

        if self.is_recalculating {
            self.pending_sample = Some(sample);
            notices.push(self.snapshot(config));
            return None;
        }

        let (Some(route), Some(destination)) = (self.route.clone(), self.destination.clone()) else {
            notices.push(self.snapshot(config));
            return None;
        };
        let position = sample.position();

        let off_route_m = off_route_distance(&route, position, config.off_route_metric);
        if off_route_m > config.off_route_threshold_m {
            info!(off_route_m, "off route, recalculating");
            self.is_off_route = true;
            notices.push(self.snapshot(config));

            self.is_recalculating = true;
            self.in_flight += 1;
            notices.push(self.snapshot(config));
            return Some(RecalcJob {
                ticket: self.ticket,
                origin: position,
                destination: destination.position(),
                options: self.route_options,
            });
        }
        self.is_off_route = false;

        let mut advanced = false;
        while let Some(next) = route.steps.get(self.current_step_index + 1) {
            if haversine_m(position, next.coordinates) > config.maneuver_tolerance_m {
                break;
            }
            self.current_step_index += 1;
            advanced = true;
        }
        if advanced {
            self.remaining_distance_meters = route.distance_from(self.current_step_index);
            self.remaining_time_seconds = route.duration_from(self.current_step_index);
            debug!(step = self.current_step_index, "advanced to next step");
        }

        self.refresh_progress(&route, &destination, position, now, config);
        notices.push(self.snapshot(config));
        None
    }

    fn refresh_progress(
        &mut self,
        route: &Route,
        destination: &Destination,
        position: LonLat,
        now: DateTime<Utc>,
        config: &SessionConfig,
    ) {
        let Some(step) = route.steps.get(self.current_step_index) else {
            return;
        };

        // On the final step the remaining distance follows the live position
        // so arrival can be detected.
        if self.current_step_index == route.last_step_index() {
            let live = haversine_m(position, step.coordinates).min(step.distance_meters);
            self.remaining_distance_meters = live;
            self.remaining_time_seconds = if step.distance_meters > 0.0 {
                step.duration_seconds * live / step.distance_meters
            } else {
                0.0
            };
        }

        self.eta = eta_from(now, self.remaining_time_seconds);
        self.last_mile_walking = step.maneuver_type != ManeuverType::Arrive
            && haversine_m(position, destination.position()) < config.walking_threshold_m;
    }
}

fn classify_signal(sample: &LocationSample, config: &SessionConfig) -> GpsSignalStrength {
    if sample.synthetic {
        return GpsSignalStrength::Weak;
    }
    match sample.accuracy_meters {
        Some(accuracy) if accuracy > config.weak_accuracy_m => GpsSignalStrength::Weak,
        _ => GpsSignalStrength::Strong,
    }
}

fn off_route_distance(route: &Route, position: LonLat, metric: OffRouteMetric) -> f64 {
    let from_geometry = match metric {
        OffRouteMetric::Segment => route.geometry.distance_to_m(position),
        OffRouteMetric::Vertex => route.geometry.nearest_vertex_distance_m(position),
    };
    // Routes without geometry are checked against their maneuver points.
    from_geometry
        .or_else(|| {
            route
                .steps
                .iter()
                .map(|step| haversine_m(position, step.coordinates))
                .min_by(|a, b| a.total_cmp(b))
        })
        .unwrap_or(0.0)
}

/// `None` when the arrival time is past the representable date range.
fn eta_from(now: DateTime<Utc>, remaining_seconds: f64) -> Option<DateTime<Utc>> {
    let remaining = TimeDelta::try_milliseconds((remaining_seconds * 1000.0).round() as i64)?;
    now.checked_add_signed(remaining)
}

/// Arrival time for a freshly installed route.
fn route_eta(route: &Route, now: DateTime<Utc>) -> Result<DateTime<Utc>, NavError> {
    eta_from(now, route.duration_from(0)).ok_or_else(|| {
        NavError::InvalidRoute(format!(
            "route {} duration {}s is out of range",
            route.id, route.duration_seconds
        ))
    })
}

struct Shared {
    state: Mutex<SessionState>,
    recalculated: Condvar,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    routing: Arc<RoutingClient>,
    settings: Option<Arc<SettingsStore>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

pub struct SessionBuilder {
    routing: Arc<RoutingClient>,
    settings: Option<Arc<SettingsStore>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Route options for [`NavigationSession::start`] follow the stored
    /// route preference.
    pub fn settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> NavigationSession {
        NavigationSession {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::default()),
                recalculated: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                routing: self.routing,
                settings: self.settings,
                clock: self.clock,
                config: self.config,
            }),
        }
    }
}

#[derive(Clone)]
pub struct NavigationSession {
    shared: Arc<Shared>,
}

impl NavigationSession {
    pub fn new(routing: Arc<RoutingClient>, config: SessionConfig) -> Self {
        Self::builder(routing).config(config).build()
    }

    pub fn builder(routing: Arc<RoutingClient>) -> SessionBuilder {
        SessionBuilder {
            routing,
            settings: None,
            clock: Arc::new(SystemClock),
            config: SessionConfig::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.lock().snapshot(&self.shared.config)
    }

    /// Start navigating `route` toward `destination`.
    ///
    /// Recalculations use the stored route preference when settings are
    /// attached, default options otherwise.
    pub fn start(&self, destination: Destination, route: Route) -> Result<NavigationSnapshot, NavError> {
        let options = self
            .shared
            .settings
            .as_ref()
            .map(|settings| RouteOptions::from_preference(settings.get().route_preference))
            .unwrap_or_default();
        self.start_with_options(destination, route, options)
    }

    pub fn start_with_options(
        &self,
        destination: Destination,
        route: Route,
        options: RouteOptions,
    ) -> Result<NavigationSnapshot, NavError> {
        validate_route(&route)?;
        let eta = route_eta(&route, self.shared.clock.now())?;

        let snapshot = {
            let mut state = self.lock();
            // Abandon whatever the previous session had in flight.
            state.clear();
            info!(
                route_id = %route.id,
                steps = route.steps.len(),
                distance_m = route.distance_meters,
                fallback = route.is_fallback(),
                destination = %destination.name,
                "navigation started"
            );
            state.is_active = true;
            state.destination = Some(destination);
            state.route_options = options;
            state.install_route(Arc::new(route), eta);
            state.snapshot(&self.shared.config)
        };

        self.publish(vec![snapshot.clone()]);
        Ok(snapshot)
    }

    /// Calculate a route from `origin` and start navigating it.
    pub fn navigate(
        &self,
        origin: LonLat,
        destination: Destination,
        options: RouteOptions,
    ) -> Result<NavigationSnapshot, NavError> {
        let route = self
            .shared
            .routing
            .calculate_route(origin, destination.position(), options)?;
        self.start_with_options(destination, route, options)
    }

    /// Feed one location sample into the session.
    pub fn update_location(&self, sample: LocationSample) {
        let now = self.shared.clock.now();
        let mut notices = Vec::new();
        let job = self
            .lock()
            .apply_sample(sample, now, &self.shared.config, &mut notices);

        self.publish(notices);
        if let Some(job) = job {
            self.dispatch(job);
        }
    }

    /// Record a geolocation failure. The session keeps running.
    pub fn report_location_error(&self, error: &PositionError) {
        let snapshot = {
            let mut state = self.lock();
            warn!(%error, "location error, GPS signal lost");
            state.gps_signal_strength = GpsSignalStrength::Lost;
            state.snapshot(&self.shared.config)
        };
        self.publish(vec![snapshot]);
    }

    /// Mark the signal lost if no sample arrived within the configured
    /// timeout. Meant to be called periodically by the host application.
    pub fn refresh_signal(&self) -> GpsSignalStrength {
        let now = self.shared.clock.now();
        let timeout = chrono::Duration::from_std(self.shared.config.signal_timeout)
            .unwrap_or(chrono::Duration::MAX);

        let (strength, changed) = {
            let mut state = self.lock();
            let stale = state
                .last_sample_at
                .is_none_or(|last| now - last > timeout);
            if stale && state.gps_signal_strength != GpsSignalStrength::Lost {
                debug!("no location sample within timeout, GPS signal lost");
                state.gps_signal_strength = GpsSignalStrength::Lost;
                (state.gps_signal_strength, Some(state.snapshot(&self.shared.config)))
            } else {
                (state.gps_signal_strength, None)
            }
        };

        if let Some(snapshot) = changed {
            self.publish(vec![snapshot]);
        }
        strength
    }

    /// Cancel navigation. Does nothing when already idle.
    pub fn stop(&self) {
        let snapshot = {
            let mut state = self.lock();
            if !state.is_active {
                return;
            }
            state.clear();
            info!("navigation stopped");
            state.snapshot(&self.shared.config)
        };
        self.publish(vec![snapshot]);
    }

    /// Finish a session that has reached its destination.
    pub fn confirm_arrival(&self) -> Result<(), NavError> {
        let snapshot = {
            let mut state = self.lock();
            if !state.is_active {
                return Err(NavError::NotActive);
            }
            if !state.can_confirm_arrival(&self.shared.config) {
                return Err(NavError::ArrivalNotReached);
            }
            let destination = state
                .destination
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_default();
            state.clear();
            info!(%destination, "arrival confirmed");
            state.snapshot(&self.shared.config)
        };
        self.publish(vec![snapshot]);
        Ok(())
    }

    /// Call `listener` with a snapshot after every transition.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NavigationSnapshot) + Send + Sync + 'static,
    {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Route the tracker's samples and errors into this session.
    pub fn attach(&self, tracker: &mut LocationTracker) -> Result<(), NavError> {
        let on_sample = self.clone();
        let on_error = self.clone();
        let started = tracker.start(
            move |sample| on_sample.update_location(sample),
            move |error| on_error.report_location_error(&error),
        );
        if let Err(NavError::LocationUnavailable(error)) = &started {
            self.report_location_error(error);
        }
        started
    }

    /// Block until no recalculation is in flight, up to `timeout`.
    ///
    /// Returns `false` if a recalculation is still running.
    pub fn wait_for_recalculation(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .shared
            .recalculated
            .wait_timeout_while(guard, timeout, |state| state.in_flight > 0)
            .unwrap_or_else(|e| e.into_inner());
        guard.in_flight == 0
    }

    fn dispatch(&self, job: RecalcJob) {
        match self.shared.config.recalculation {
            RecalculationMode::Background => {
                let session = self.clone();
                let spawned = thread::Builder::new()
                    .name("route-recalc".to_string())
                    .spawn(move || session.recalculate(job));
                if let Err(err) = spawned {
                    warn!(error = %err, "could not spawn recalculation thread, recalculating inline");
                    self.recalculate(job);
                }
            }
            RecalculationMode::Inline => self.recalculate(job),
        }
    }

    fn recalculate(&self, job: RecalcJob) {
        let now = self.shared.clock.now();
        let result = self
            .shared
            .routing
            .calculate_route(job.origin, job.destination, job.options)
            .and_then(|route| route_eta(&route, now).map(|eta| (route, eta)))
            .map_err(|err| NavError::Recalculation(err.to_string()));

        let mut notices = Vec::new();
        let next_job = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);

            if state.ticket != job.ticket || !state.is_active {
                debug!("discarding recalculated route for a finished session");
                None
            } else {
                match result {
                    Ok((route, eta)) => {
                        info!(
                            route_id = %route.id,
                            fallback = route.is_fallback(),
                            "route recalculated"
                        );
                        state.install_route(Arc::new(route), eta);
                    }
                    Err(err) => warn!(error = %err, "keeping previous route"),
                }
                state.is_recalculating = false;
                state.is_off_route = false;
                notices.push(state.snapshot(&self.shared.config));

                state
                    .pending_sample
                    .take()
                    .and_then(|sample| state.apply_sample(sample, now, &self.shared.config, &mut notices))
            }
        };

        self.shared.recalculated.notify_all();
        self.publish(notices);
        if let Some(job) = next_job {
            self.dispatch(job);
        }
    }

    fn publish(&self, notices: Vec<NavigationSnapshot>) {
        if notices.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for snapshot in &notices {
            for listener in &listeners {
                listener(snapshot);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
