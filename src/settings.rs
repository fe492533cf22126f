//! Durable navigation presentation preferences.
//!
//! Settings live independently of any navigation session. Every accepted
//! update is written through to the configured [`SettingsBackend`] before it
//! becomes visible to readers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::NavError;
use crate::traits::SettingsBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapStyle {
    #[default]
    Navigation,
    Satellite,
    Terrain,
    Street,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "2d")]
    TwoD,
    #[default]
    #[serde(rename = "3d")]
    ThreeD,
    #[serde(rename = "bird-eye")]
    BirdEye,
    #[serde(rename = "follow")]
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePreference {
    #[default]
    Fastest,
    Shortest,
    Eco,
    AvoidHighways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Units {
    Metric,
    #[default]
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    Auto,
    Day,
    Night,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationSettings {
    pub map_style: MapStyle,
    pub view_mode: ViewMode,
    pub show_traffic: bool,
    pub show_incidents: bool,
    pub show_speed_limits: bool,
    pub show_lane_guidance: bool,
    pub voice_guidance: bool,
    pub route_preference: RoutePreference,
    pub units: Units,
    pub theme: Theme,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            map_style: MapStyle::Navigation,
            view_mode: ViewMode::ThreeD,
            show_traffic: true,
            show_incidents: true,
            show_speed_limits: true,
            show_lane_guidance: true,
            voice_guidance: true,
            route_preference: RoutePreference::Fastest,
            units: Units::Imperial,
            theme: Theme::Auto,
        }
    }
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_style: Option<MapStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<ViewMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_traffic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_incidents: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_speed_limits: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_lane_guidance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_guidance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_preference: Option<RoutePreference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<Units>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut NavigationSettings) {
        if let Some(value) = self.map_style {
            settings.map_style = value;
        }
        if let Some(value) = self.view_mode {
            settings.view_mode = value;
        }
        if let Some(value) = self.show_traffic {
            settings.show_traffic = value;
        }
        if let Some(value) = self.show_incidents {
            settings.show_incidents = value;
        }
        if let Some(value) = self.show_speed_limits {
            settings.show_speed_limits = value;
        }
        if let Some(value) = self.show_lane_guidance {
            settings.show_lane_guidance = value;
        }
        if let Some(value) = self.voice_guidance {
            settings.voice_guidance = value;
        }
        if let Some(value) = self.route_preference {
            settings.route_preference = value;
        }
        if let Some(value) = self.units {
            settings.units = value;
        }
        if let Some(value) = self.theme {
            settings.theme = value;
        }
    }

    /// Parse an untyped JSON object, naming the first offending field.
    ///
    /// `null` is not a value of any setting and is rejected like any other
    /// out-of-domain value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, NavError> {
        let Some(fields) = value.as_object() else {
            return Err(NavError::InvalidSetting {
                field: String::new(),
                value: value.to_string(),
            });
        };

        let mut patch = SettingsPatch::default();
        for (field, raw) in fields {
            if raw.is_null() {
                return Err(NavError::InvalidSetting {
                    field: field.clone(),
                    value: raw.to_string(),
                });
            }
            let mut single = serde_json::Map::new();
            single.insert(field.clone(), raw.clone());
            let parsed: SettingsPatch = serde_json::from_value(serde_json::Value::Object(single))
                .map_err(|_| NavError::InvalidSetting {
                    field: field.clone(),
                    value: raw.to_string(),
                })?;
            patch.merge(parsed);
        }
        Ok(patch)
    }

    fn merge(&mut self, other: SettingsPatch) {
        self.map_style = other.map_style.or(self.map_style);
        self.view_mode = other.view_mode.or(self.view_mode);
        self.show_traffic = other.show_traffic.or(self.show_traffic);
        self.show_incidents = other.show_incidents.or(self.show_incidents);
        self.show_speed_limits = other.show_speed_limits.or(self.show_speed_limits);
        self.show_lane_guidance = other.show_lane_guidance.or(self.show_lane_guidance);
        self.voice_guidance = other.voice_guidance.or(self.voice_guidance);
        self.route_preference = other.route_preference.or(self.route_preference);
        self.units = other.units.or(self.units);
        self.theme = other.theme.or(self.theme);
    }
}

/// Settings persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<NavigationSettings>, NavError> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(&self.path, err)),
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|err| storage_error(&self.path, err))
    }

    fn save(&self, settings: &NavigationSettings) -> Result<(), NavError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| storage_error(parent, err))?;
        }
        let body = serde_json::to_string_pretty(settings).map_err(|err| storage_error(&self.path, err))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, body).map_err(|err| storage_error(&tmp_path, err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| storage_error(&self.path, err))?;
        Ok(())
    }
}

fn storage_error(path: &Path, err: impl std::fmt::Display) -> NavError {
    NavError::SettingsStorage(format!("{}: {}", path.display(), err))
}

/// In-memory backend, for tests and platforms without local storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<NavigationSettings>>,
}

impl SettingsBackend for MemoryBackend {
    fn load(&self) -> Result<Option<NavigationSettings>, NavError> {
        Ok(self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, settings: &NavigationSettings) -> Result<(), NavError> {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = Some(settings.clone());
        Ok(())
    }
}

pub struct SettingsStore {
    current: RwLock<NavigationSettings>,
    backend: Box<dyn SettingsBackend>,
}

impl SettingsStore {
    /// Open a store, loading previously saved settings.
    ///
    /// Unreadable or corrupt storage is logged and replaced by defaults.
    pub fn open(backend: Box<dyn SettingsBackend>) -> Self {
        let current = match backend.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => NavigationSettings::default(),
            Err(err) => {
                warn!(error = %err, "could not load navigation settings, using defaults");
                NavigationSettings::default()
            }
        };
        Self {
            current: RwLock::new(current),
            backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryBackend::default()))
    }

    pub fn get(&self) -> NavigationSettings {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Merge `patch` into the current settings and persist the result.
    ///
    /// If persisting fails the store is left unchanged.
    pub fn update(&self, patch: &SettingsPatch) -> Result<NavigationSettings, NavError> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = current.clone();
        patch.apply(&mut next);
        if next != *current {
            self.backend.save(&next)?;
            debug!(?patch, "navigation settings updated");
        }
        *current = next.clone();
        Ok(next)
    }

    /// Update from untyped JSON, rejecting unknown fields and out-of-enum
    /// values before anything is changed.
    pub fn update_json(&self, value: &serde_json::Value) -> Result<NavigationSettings, NavError> {
        let patch = SettingsPatch::from_json(value)?;
        self.update(&patch)
    }

    pub fn reset(&self) -> Result<NavigationSettings, NavError> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let defaults = NavigationSettings::default();
        self.backend.save(&defaults)?;
        *current = defaults.clone();
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = NavigationSettings::default();
        assert_eq!(settings.view_mode, ViewMode::ThreeD);
        assert!(settings.voice_guidance);
        assert_eq!(settings.units, Units::Imperial);
        assert_eq!(settings.theme, Theme::Auto);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(NavigationSettings::default()).unwrap();
        assert_eq!(json["viewMode"], json!("3d"));
        assert_eq!(json["mapStyle"], json!("navigation"));
        assert_eq!(json["routePreference"], json!("fastest"));
        let mode: ViewMode = serde_json::from_value(json!("bird-eye")).unwrap();
        assert_eq!(mode, ViewMode::BirdEye);
    }

    #[test]
    fn test_patch_from_json_names_bad_field() {
        let err = SettingsPatch::from_json(&json!({"voiceGuidance": false, "units": "furlongs"})).unwrap_err();
        match err {
            NavError::InvalidSetting { field, value } => {
                assert_eq!(field, "units");
                assert_eq!(value, "\"furlongs\"");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_patch_from_json_rejects_unknown_field() {
        let err = SettingsPatch::from_json(&json!({"colour": "red"})).unwrap_err();
        assert!(matches!(err, NavError::InvalidSetting { .. }));
    }

    #[test]
    fn test_patch_from_json_rejects_null() {
        let err = SettingsPatch::from_json(&json!({"voiceGuidance": null})).unwrap_err();
        match err {
            NavError::InvalidSetting { field, value } => {
                assert_eq!(field, "voiceGuidance");
                assert_eq!(value, "null");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_patch_from_json_accepts_valid_fields() {
        let patch = SettingsPatch::from_json(&json!({"viewMode": "2d", "theme": "night"})).unwrap();
        assert_eq!(patch.view_mode, Some(ViewMode::TwoD));
        assert_eq!(patch.theme, Some(Theme::Night));
        assert_eq!(patch.units, None);
    }

    #[test]
    fn test_partial_stored_settings_fill_defaults() {
        let settings: NavigationSettings = serde_json::from_value(json!({"units": "metric"})).unwrap();
        assert_eq!(settings.units, Units::Metric);
        assert!(settings.voice_guidance);
    }
}
