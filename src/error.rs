//! Error kinds surfaced by the navigation core.

use std::fmt;

/// Geolocation failure code reported by a position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl fmt::Display for PositionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PositionErrorCode::PermissionDenied => "permission denied",
            PositionErrorCode::PositionUnavailable => "position unavailable",
            PositionErrorCode::Timeout => "timed out",
        };
        f.write_str(label)
    }
}

/// A geolocation error as delivered by the platform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct PositionError {
    pub code: PositionErrorCode,
    pub message: String,
}

impl PositionError {
    pub fn new(code: PositionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// A route failed structural validation.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// Transport, status or payload failure from the external routing provider.
    #[error("routing provider failed: {0}")]
    RoutingProvider(String),

    #[error("location unavailable: {0}")]
    LocationUnavailable(#[from] PositionError),

    /// A settings field was given a value outside its enum.
    #[error("invalid value {value} for setting `{field}`")]
    InvalidSetting { field: String, value: String },

    #[error("route recalculation failed: {0}")]
    Recalculation(String),

    #[error("settings storage: {0}")]
    SettingsStorage(String),

    #[error("no active navigation session")]
    NotActive,

    #[error("destination not reached yet")]
    ArrivalNotReached,
}

impl From<reqwest::Error> for NavError {
    fn from(err: reqwest::Error) -> Self {
        NavError::RoutingProvider(err.to_string())
    }
}
