//! TOML config file loading, environment overrides, and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::models::PredictRequest;

const DEFAULT_BASE_URL: &str = "https://web-production-2218a.up.railway.app";

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub field: FieldProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    pub history_path: String,
    /// WebSocket endpoint for live predictions.  No feed when unset.
    pub feed_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            history_path: "/predictions/history".to_string(),
            feed_url: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub zones_sec: u64,
    pub history_sec: u64,
    pub weather_sec: u64,
    pub debounce_ms: u64,
    pub feed_reconnect_sec: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            zones_sec: 10,
            history_sec: 5,
            weather_sec: 300,
            debounce_ms: 1_000,
            feed_reconnect_sec: 2,
        }
    }
}

impl PollingSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Site parameters sent with every `POST /predict`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldProfile {
    pub latitude: f64,
    pub longitude: f64,
    pub soil_type: String,
    pub slope: f64,
    pub crop_kc: f64,
    pub calibration_factor: f64,
}

impl Default for FieldProfile {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            soil_type: "loam".to_string(),
            slope: 0.0,
            crop_kc: 1.0,
            calibration_factor: 1.0,
        }
    }
}

impl FieldProfile {
    /// Build a prediction request for a reading.  Without a previous reading
    /// the lag is the current value.
    pub fn request(&self, soil_moisture: f64, lag1: Option<f64>) -> PredictRequest {
        PredictRequest {
            soil_moisture,
            soil_moisture_lag1: lag1.unwrap_or(soil_moisture),
            latitude: self.latitude,
            longitude: self.longitude,
            soil_type: self.soil_type.clone(),
            slope: self.slope,
            crop_kc: self.crop_kc,
            calibration_factor: self.calibration_factor,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn is_ws_url(s: &str) -> bool {
    s.starts_with("ws://") || s.starts_with("wss://")
}

impl Config {
    /// Validate every section.  Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_api(&mut errors);
        self.validate_polling(&mut errors);
        self.validate_field(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_api(&self, errors: &mut Vec<String>) {
        let api = &self.api;
        if !is_http_url(&api.base_url) {
            errors.push(format!(
                "api.base_url '{}' must start with http:// or https://",
                api.base_url
            ));
        }
        if !api.history_path.starts_with('/') {
            errors.push(format!(
                "api.history_path '{}' must start with '/'",
                api.history_path
            ));
        }
        if let Some(feed) = &api.feed_url {
            if !is_ws_url(feed) {
                errors.push(format!(
                    "api.feed_url '{feed}' must start with ws:// or wss://"
                ));
            }
        }
        if api.timeout_ms == 0 {
            errors.push("api.timeout_ms must be positive".to_string());
        }
    }

    fn validate_polling(&self, errors: &mut Vec<String>) {
        let p = &self.polling;
        for (name, value) in [
            ("zones_sec", p.zones_sec),
            ("history_sec", p.history_sec),
            ("weather_sec", p.weather_sec),
            ("debounce_ms", p.debounce_ms),
            ("feed_reconnect_sec", p.feed_reconnect_sec),
        ] {
            if value == 0 {
                errors.push(format!("polling.{name} must be positive"));
            }
        }
    }

    fn validate_field(&self, errors: &mut Vec<String>) {
        let f = &self.field;
        if !(-90.0..=90.0).contains(&f.latitude) {
            errors.push(format!(
                "field.latitude {} out of range [-90, 90]",
                f.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&f.longitude) {
            errors.push(format!(
                "field.longitude {} out of range [-180, 180]",
                f.longitude
            ));
        }
        if f.soil_type.trim().is_empty() {
            errors.push("field.soil_type is empty".to_string());
        }
        if f.crop_kc.is_nan() || f.crop_kc <= 0.0 {
            errors.push(format!("field.crop_kc must be positive, got {}", f.crop_kc));
        }
        if f.calibration_factor.is_nan() || f.calibration_factor <= 0.0 {
            errors.push(format!(
                "field.calibration_factor must be positive, got {}",
                f.calibration_factor
            ));
        }
    }

    /// Environment variables win over the file.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(url) = env::var("FEED_URL") {
            self.api.feed_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Ok(port) = env::var("WEB_PORT") {
            self.web.port = port
                .parse()
                .with_context(|| format!("WEB_PORT '{port}' is not a port number"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read and parse a TOML config file (no validation).
pub fn parse_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

/// Load the config file if present (defaults otherwise), apply environment
/// overrides, and validate the result.
pub fn load(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        parse_file(path)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    config.apply_env()?;
    config
        .validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[api]
base_url = "http://localhost:8000"
history_path = "/history"
feed_url = "ws://localhost:8000/ws"
timeout_ms = 5000

[polling]
zones_sec = 15
history_sec = 5
weather_sec = 600
debounce_ms = 500
feed_reconnect_sec = 3

[web]
port = 9090

[field]
latitude = 9.93
longitude = 76.26
soil_type = "clay"
slope = 2.5
crop_kc = 1.15
calibration_factor = 0.9
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.history_path, "/history");
        assert_eq!(config.api.feed_url.as_deref(), Some("ws://localhost:8000/ws"));
        assert_eq!(config.polling.debounce(), Duration::from_millis(500));
        assert_eq!(config.web.port, 9090);
        assert_eq!(config.field.soil_type, "clay");
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.history_path, "/predictions/history");
        assert!(config.api.feed_url.is_none());
        assert_eq!(config.polling.debounce_ms, 1_000);
        assert_eq!(config.polling.history_sec, 5);
        assert_eq!(config.web.port, 8080);
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[polling]\nzones_sec = 30\n").unwrap();
        assert_eq!(config.polling.zones_sec, 30);
        assert_eq!(config.polling.weather_sec, 300);
    }

    #[test]
    fn parse_file_missing_is_error() {
        let err = parse_file(Path::new("/nonexistent/dashboard.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn base_url_scheme_required() {
        let mut cfg = Config::default();
        cfg.api.base_url = "localhost:8000".into();
        assert_validation_err(&cfg, "api.base_url");
    }

    #[test]
    fn feed_url_must_be_websocket() {
        let mut cfg = Config::default();
        cfg.api.feed_url = Some("http://localhost/ws".into());
        assert_validation_err(&cfg, "must start with ws:// or wss://");
    }

    #[test]
    fn history_path_needs_leading_slash() {
        let mut cfg = Config::default();
        cfg.api.history_path = "history".into();
        assert_validation_err(&cfg, "api.history_path");
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut cfg = Config::default();
        cfg.polling.debounce_ms = 0;
        assert_validation_err(&cfg, "polling.debounce_ms must be positive");
    }

    #[test]
    fn latitude_out_of_range() {
        let mut cfg = Config::default();
        cfg.field.latitude = 91.0;
        assert_validation_err(&cfg, "field.latitude 91 out of range");
    }

    #[test]
    fn nan_crop_kc_rejected() {
        let mut cfg = Config::default();
        cfg.field.crop_kc = f64::NAN;
        assert_validation_err(&cfg, "field.crop_kc must be positive");
    }

    #[test]
    fn non_positive_calibration_factor_rejected() {
        let mut cfg = Config::default();
        cfg.field.calibration_factor = 0.0;
        assert_validation_err(&cfg, "field.calibration_factor must be positive");
        cfg.field.calibration_factor = f64::NAN;
        assert_validation_err(&cfg, "field.calibration_factor must be positive");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.api.base_url = "".into();
        cfg.api.timeout_ms = 0;
        cfg.polling.zones_sec = 0;
        cfg.field.longitude = 500.0;
        cfg.field.soil_type = " ".into();

        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("(5 errors)"), "wrong count in: {msg}");
        assert!(msg.contains("api.base_url"));
        assert!(msg.contains("api.timeout_ms"));
        assert!(msg.contains("polling.zones_sec"));
        assert!(msg.contains("field.longitude"));
        assert!(msg.contains("field.soil_type"));
    }

    // -- Field profile ----------------------------------------------------

    #[test]
    fn request_defaults_lag_to_current() {
        let req = FieldProfile::default().request(30.0, None);
        assert_eq!(req.soil_moisture_lag1, 30.0);
        assert_eq!(req.soil_type, "loam");

        let req = FieldProfile::default().request(30.0, Some(33.0));
        assert_eq!(req.soil_moisture_lag1, 33.0);
    }
}
