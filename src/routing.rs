//! Routing client: provider call with a bounded wait and a local fallback.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::NavError;
use crate::haversine::FallbackRouter;
use crate::route::{LonLat, Route, validate_route};
use crate::traits::{RouteOptions, RouteProvider, RouteRequest};

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Longest wait for the provider before the fallback route is used.
    pub timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Produces routes from an external provider, or a deterministic
/// straight-line estimate when the provider cannot deliver one.
#[derive(Clone)]
pub struct RoutingClient {
    provider: Option<Arc<dyn RouteProvider>>,
    fallback: FallbackRouter,
    config: RoutingConfig,
}

impl RoutingClient {
    pub fn new(provider: Arc<dyn RouteProvider>, config: RoutingConfig) -> Self {
        Self {
            provider: Some(provider),
            fallback: FallbackRouter::default(),
            config,
        }
    }

    /// A client with no provider; every route is a fallback route.
    pub fn offline() -> Self {
        Self {
            provider: None,
            fallback: FallbackRouter::default(),
            config: RoutingConfig::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackRouter) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> &FallbackRouter {
        &self.fallback
    }

    /// Calculate a route from `origin` to `destination`.
    ///
    /// Provider failures, timeouts and invalid provider routes are recovered
    /// with the fallback generator. Only a fallback route that fails
    /// validation is returned as an error.
    pub fn calculate_route(
        &self,
        origin: LonLat,
        destination: LonLat,
        options: RouteOptions,
    ) -> Result<Route, NavError> {
        let request = RouteRequest {
            origin,
            destination,
            options,
        };

        match self.request_provider(&request) {
            Ok(route) => return Ok(route),
            Err(NavError::RoutingProvider(reason)) if self.provider.is_some() => {
                warn!(%reason, "routing provider failed, using fallback route");
            }
            Err(err) => debug!(error = %err, "no routing provider route"),
        }

        let route = self.fallback.generate(&request);
        validate_route(&route)?;
        Ok(route)
    }

    fn request_provider(&self, request: &RouteRequest) -> Result<Route, NavError> {
        let Some(provider) = self.provider.clone() else {
            return Err(NavError::RoutingProvider("no provider configured".to_string()));
        };

        // The provider may block on I/O; run it on its own thread so the
        // caller never waits longer than the configured timeout.
        let (tx, rx) = mpsc::channel();
        let owned = request.clone();
        thread::Builder::new()
            .name("route-request".to_string())
            .spawn(move || {
                let _ = tx.send(provider.route(&owned));
            })
            .map_err(|err| NavError::RoutingProvider(format!("spawn failed: {}", err)))?;

        let route = match rx.recv_timeout(self.config.timeout) {
            Ok(result) => result?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(NavError::RoutingProvider(format!(
                    "no response within {:?}",
                    self.config.timeout
                )));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(NavError::RoutingProvider("provider thread exited".to_string()));
            }
        };

        validate_route(&route).map_err(|err| NavError::RoutingProvider(err.to_string()))?;
        Ok(route)
    }
}
