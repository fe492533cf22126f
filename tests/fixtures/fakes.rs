//! Fakes for the collaborators the navigation core depends on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use parking_nav::error::{NavError, PositionError};
use parking_nav::haversine::FallbackRouter;
use parking_nav::location::LocationSample;
use parking_nav::polyline::Polyline;
use parking_nav::route::{LonLat, ManeuverType, Route, RouteSource, RouteStep};
use parking_nav::traits::{Clock, PositionSink, PositionSource, RouteProvider, RouteRequest, WatchId, WatchOptions};

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Position source
// ============================================================================

#[derive(Default)]
pub struct FakePositionSource {
    sinks: Mutex<HashMap<u64, PositionSink>>,
    next_id: AtomicU64,
    cached: Mutex<Option<LocationSample>>,
    deny: Mutex<Option<PositionError>>,
    last_options: Mutex<Option<WatchOptions>>,
}

impl FakePositionSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cached_fix(self: Arc<Self>, sample: LocationSample) -> Arc<Self> {
        *self.cached.lock().unwrap() = Some(sample);
        self
    }

    pub fn denying(self: Arc<Self>, error: PositionError) -> Arc<Self> {
        *self.deny.lock().unwrap() = Some(error);
        self
    }

    pub fn push(&self, sample: LocationSample) {
        for sink in self.sinks.lock().unwrap().values() {
            sink(Ok(sample.clone()));
        }
    }

    pub fn fail(&self, error: PositionError) {
        for sink in self.sinks.lock().unwrap().values() {
            sink(Err(error.clone()));
        }
    }

    pub fn active_watches(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        *self.last_options.lock().unwrap()
    }
}

impl PositionSource for FakePositionSource {
    fn current_fix(&self) -> Option<LocationSample> {
        self.cached.lock().unwrap().clone()
    }

    fn watch(&self, options: WatchOptions, sink: PositionSink) -> Result<WatchId, PositionError> {
        if let Some(error) = self.deny.lock().unwrap().clone() {
            return Err(error);
        }
        *self.last_options.lock().unwrap() = Some(options);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().unwrap().insert(id, sink);
        Ok(WatchId(id))
    }

    fn clear_watch(&self, id: WatchId) {
        self.sinks.lock().unwrap().remove(&id.0);
    }
}

// ============================================================================
// Routing providers
// ============================================================================

/// Provider that always fails like an unreachable server.
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl RouteProvider for FailingProvider {
    fn route(&self, _request: &RouteRequest) -> Result<Route, NavError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NavError::RoutingProvider("connection refused".to_string()))
    }
}

/// Test-side handle of a [`GatedProvider`].
pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl Gate {
    /// Wait until the provider has been called.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("provider was not called");
    }

    pub fn open(&self) {
        self.release.send(()).expect("provider gone");
    }
}

/// Provider that blocks every call until the test opens the gate, then
/// answers with a straight-line route marked as a provider route.
pub struct GatedProvider {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
    pub calls: AtomicUsize,
}

impl GatedProvider {
    pub fn new() -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let provider = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (provider, gate)
    }
}

impl RouteProvider for GatedProvider {
    fn route(&self, request: &RouteRequest) -> Result<Route, NavError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.lock().unwrap().send(());
        self.release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| NavError::RoutingProvider("gate never opened".to_string()))?;

        let mut route = FallbackRouter::default().generate(request);
        route.id = "gated".to_string();
        route.source = RouteSource::Provider;
        Ok(route)
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn step(id: &str, distance: f64, duration: f64, maneuver: ManeuverType, at: LonLat) -> RouteStep {
    RouteStep {
        id: id.to_string(),
        instruction: format!("Maneuver {}", id),
        distance_meters: distance,
        duration_seconds: duration,
        maneuver_type: maneuver,
        street_name: String::new(),
        coordinates: at,
        speed_limit: None,
        lane_guidance: None,
    }
}

pub fn route_from_steps(id: &str, steps: Vec<RouteStep>, geometry: Vec<LonLat>) -> Route {
    Route {
        id: id.to_string(),
        distance_meters: steps.iter().map(|s| s.distance_meters).sum(),
        duration_seconds: steps.iter().map(|s| s.duration_seconds).sum(),
        steps,
        geometry: Polyline::new(geometry),
        traffic_delay_seconds: 0.0,
        source: RouteSource::Provider,
    }
}

/// Three steps due north along the prime meridian, ~222 m apart.
pub fn northbound_route() -> Route {
    route_from_steps(
        "northbound",
        vec![
            step("s0", 222.0, 30.0, ManeuverType::Straight, LonLat(0.0, 0.0)),
            step("s1", 222.0, 30.0, ManeuverType::TurnRight, LonLat(0.0, 0.002)),
            step("s2", 222.0, 30.0, ManeuverType::Arrive, LonLat(0.0, 0.004)),
        ],
        vec![LonLat(0.0, 0.0), LonLat(0.0, 0.002), LonLat(0.0, 0.004)],
    )
}

pub fn northbound_end() -> LonLat {
    LonLat(0.0, 0.004)
}

/// Sample at a `(lon, lat)` position.
pub fn sample_at(position: LonLat) -> LocationSample {
    LocationSample::at(position)
}
