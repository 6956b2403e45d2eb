use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Irrigation action as the backend spells it.  Unknown strings are kept
/// verbatim so they round-trip to the UI unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Irrigate,
    Wait,
    NoOp,
    Other(String),
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "IRRIGATE" => Self::Irrigate,
            "WAIT" => Self::Wait,
            "NONE" => Self::NoOp,
            _ => Self::Other(s),
        }
    }
}

impl From<Action> for String {
    fn from(a: Action) -> Self {
        match a {
            Action::Irrigate => "IRRIGATE".to_string(),
            Action::Wait => "WAIT".to_string(),
            Action::NoOp => "NONE".to_string(),
            Action::Other(s) => s,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /zones
// ---------------------------------------------------------------------------

/// One zone as reported by the backend.  Older backend revisions use
/// camelCase names, so those are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub moisture: f64,
    #[serde(default, alias = "valveOpen")]
    pub valve_open: bool,
    #[serde(default, alias = "flowRate", alias = "flowRateLitersPerMin")]
    pub flow_rate: Option<f64>,
    #[serde(default, alias = "lastDecision")]
    pub last_decision: Option<Action>,
    #[serde(default, alias = "recommendedSeconds")]
    pub recommended_seconds: Option<f64>,
    #[serde(default, alias = "predictedMoisture")]
    pub predicted_moisture: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

// ---------------------------------------------------------------------------
// GET /predictions/history and the WebSocket feed
// ---------------------------------------------------------------------------

/// One logged inference event.  `id` is empty when the backend did not send
/// one; the history layer fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "ts", deserialize_with = "string_or_number")]
    pub timestamp: String,
    #[serde(default, alias = "inputMoisture", alias = "soil_moisture")]
    pub input_moisture: Option<f64>,
    pub action: Action,
    #[serde(
        default,
        alias = "recommendedSeconds",
        alias = "recommended_valve_seconds"
    )]
    pub recommended_seconds: Option<f64>,
    #[serde(default, alias = "predictedMoisture")]
    pub predicted_moisture: Option<f64>,
}

// ---------------------------------------------------------------------------
// GET /weather
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    #[serde(default, alias = "temperature")]
    pub temperature_c: Option<f64>,
    #[serde(default, alias = "humidity")]
    pub humidity_pct: Option<f64>,
    #[serde(default, alias = "wind_speed")]
    pub wind_speed_kmh: Option<f64>,
    #[serde(default, alias = "solar_radiation")]
    pub solar_radiation_wm2: Option<f64>,
    #[serde(default, alias = "rainfall")]
    pub rainfall_mm: Option<f64>,
    #[serde(default, alias = "rain_probability")]
    pub rain_probability_pct: Option<f64>,
    #[serde(default, alias = "et", alias = "et0")]
    pub et_mm_per_day: Option<f64>,
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub soil_moisture: f64,
    pub soil_moisture_lag1: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub soil_type: String,
    pub slope: f64,
    pub crop_kc: f64,
    pub calibration_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub action: Action,
    pub predicted_moisture: f64,
    #[serde(default)]
    pub recommended_valve_seconds: Option<f64>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ids and timestamps arrive as strings from some backends and as numbers
/// (row ids, unix seconds) from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => (f.trunc() as i64).to_string(),
        Raw::Null(()) => String::new(),
    })
}

// ===========================================================================
// Tests
// ===========================================================================
