//! Location tracking on top of a platform position source.
//!
//! The tracker registers one watch with the [`PositionSource`] and pushes
//! every update to the caller. Right after start it delivers a fresh cached
//! fix, or a synthetic sample at the configured startup position, so
//! consumers do not sit on a cold GPS with no location at all.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{NavError, PositionError};
use crate::route::LonLat;
use crate::traits::{PositionSource, WatchId, WatchOptions};

/// One position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees clockwise from north, 0 when unknown.
    #[serde(default)]
    pub heading_degrees: f64,
    #[serde(default)]
    pub speed_meters_per_second: f64,
    /// Horizontal accuracy radius, if the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Placeholder delivered at startup when no real fix exists yet.
    #[serde(default)]
    pub synthetic: bool,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            heading_degrees: 0.0,
            speed_meters_per_second: 0.0,
            accuracy_meters: None,
            timestamp: Utc::now(),
            synthetic: false,
        }
    }

    pub fn at(position: LonLat) -> Self {
        Self::new(position.lat(), position.lon())
    }

    pub fn with_heading(mut self, degrees: f64) -> Self {
        self.heading_degrees = degrees;
        self
    }

    pub fn with_speed(mut self, meters_per_second: f64) -> Self {
        self.speed_meters_per_second = meters_per_second;
        self
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_meters = Some(meters);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn position(&self) -> LonLat {
        LonLat(self.longitude, self.latitude)
    }

    /// Replace unknown or out-of-range heading and speed with 0.
    pub fn normalized(mut self) -> Self {
        if !self.heading_degrees.is_finite() || !(0.0..=360.0).contains(&self.heading_degrees) {
            self.heading_degrees = 0.0;
        }
        if !self.speed_meters_per_second.is_finite() || self.speed_meters_per_second < 0.0 {
            self.speed_meters_per_second = 0.0;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub high_accuracy: bool,
    /// Wait for the first fix.
    pub timeout: Duration,
    /// Oldest cached fix accepted as a startup sample.
    pub maximum_age: Duration,
    /// Where the synthetic startup sample is placed when no fix is cached.
    /// Without one, nothing is delivered until the first real fix.
    pub startup_position: Option<LonLat>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(1),
            startup_position: None,
        }
    }
}

impl TrackerConfig {
    fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            timeout: self.timeout,
            maximum_age: self.maximum_age,
        }
    }
}

/// Event form of tracker output, used by [`LocationTracker::start_channel`].
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Sample(LocationSample),
    Error(PositionError),
}

pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    config: TrackerConfig,
    watch: Option<WatchId>,
}

impl LocationTracker {
    pub fn new(source: Arc<dyn PositionSource>, config: TrackerConfig) -> Self {
        Self {
            source,
            config,
            watch: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.watch.is_some()
    }

    /// Begin observing position.
    ///
    /// Fails with [`NavError::LocationUnavailable`] when the platform refuses
    /// the watch. Calling `start` while running replaces the previous watch.
    pub fn start<S, E>(&mut self, on_sample: S, on_error: E) -> Result<(), NavError>
    where
        S: Fn(LocationSample) + Send + Sync + 'static,
        E: Fn(PositionError) + Send + Sync + 'static,
    {
        self.stop();

        let on_sample = Arc::new(on_sample);
        // Set once a real fix went out. Held while delivering so the startup
        // sample can never land after a real one.
        let delivered = Arc::new(Mutex::new(false));

        let sink_sample = Arc::clone(&on_sample);
        let sink_delivered = Arc::clone(&delivered);
        let sink = Box::new(move |update: Result<LocationSample, PositionError>| match update {
            Ok(sample) => {
                let mut delivered = sink_delivered.lock().unwrap_or_else(|e| e.into_inner());
                *delivered = true;
                sink_sample(sample.normalized());
            }
            Err(err) => {
                debug!(error = %err, "position update failed");
                on_error(err);
            }
        });

        let id = self
            .source
            .watch(self.config.watch_options(), sink)
            .map_err(|err| {
                warn!(error = %err, "could not start position watch");
                NavError::LocationUnavailable(err)
            })?;
        self.watch = Some(id);
        info!(watch = id.0, "location tracking started");

        let delivered = delivered.lock().unwrap_or_else(|e| e.into_inner());
        if !*delivered {
            if let Some(sample) = self.startup_sample() {
                on_sample(sample);
            }
        }

        Ok(())
    }

    /// Start tracking and receive updates over a channel.
    pub fn start_channel(&mut self) -> Result<mpsc::Receiver<LocationEvent>, NavError> {
        let (tx, rx) = mpsc::channel();
        let error_tx = tx.clone();
        self.start(
            move |sample| {
                let _ = tx.send(LocationEvent::Sample(sample));
            },
            move |err| {
                let _ = error_tx.send(LocationEvent::Error(err));
            },
        )?;
        Ok(rx)
    }

    /// Stop observing. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        if let Some(id) = self.watch.take() {
            self.source.clear_watch(id);
            info!(watch = id.0, "location tracking stopped");
        }
    }

    fn startup_sample(&self) -> Option<LocationSample> {
        let max_age = chrono::Duration::from_std(self.config.maximum_age).unwrap_or(chrono::Duration::zero());
        match self.source.current_fix() {
            Some(fix) if Utc::now() - fix.timestamp <= max_age => Some(fix.normalized()),
            _ => {
                let position = self.config.startup_position?;
                debug!("no fresh fix cached, delivering synthetic startup sample");
                Some(LocationSample {
                    synthetic: true,
                    ..LocationSample::at(position)
                })
            }
        }
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
