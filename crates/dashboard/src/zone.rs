//! Zone adapter: turns backend zone records into the fields a zone card
//! renders.  The label strings are matched literally by the UI.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::decision::IRRIGATE_BELOW;
use crate::models::{Action, ZoneRecord};

const NO_IRRIGATION: &str = "No irrigation required";
const NOT_AVAILABLE: &str = "N/A";

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusBucket {
    NeedsIrrigation,
    Irrigated,
    Scheduled,
}

impl StatusBucket {
    pub fn label(self) -> &'static str {
        match self {
            Self::NeedsIrrigation => "Needs Irrigation",
            Self::Irrigated => "Irrigated",
            Self::Scheduled => "Scheduled",
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeedsIrrigation => write!(f, "needs-irrigation"),
            Self::Irrigated => write!(f, "irrigated"),
            Self::Scheduled => write!(f, "scheduled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneViewModel {
    pub name: String,
    pub moisture: f64,
    pub moisture_label: String,
    pub valve_open: bool,
    pub flow_rate_lpm: Option<f64>,
    pub flow_rate_label: String,
    pub status: StatusBucket,
    pub status_label: &'static str,
    pub recommendation_label: String,
    pub predicted_moisture: Option<f64>,
    pub confidence: Option<f64>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub fn status_bucket(moisture: f64, valve_open: bool) -> StatusBucket {
    if moisture < IRRIGATE_BELOW {
        StatusBucket::NeedsIrrigation
    } else if valve_open {
        StatusBucket::Irrigated
    } else {
        StatusBucket::Scheduled
    }
}

fn recommendation_label(raw: &ZoneRecord) -> String {
    match (&raw.last_decision, raw.recommended_seconds) {
        (Some(Action::Irrigate), Some(secs)) => format!("Irrigate for {secs}s"),
        (Some(Action::Irrigate), None) => format!("Irrigate (duration {NOT_AVAILABLE})"),
        _ => NO_IRRIGATION.to_string(),
    }
}

pub fn adapt_zone(name: &str, raw: &ZoneRecord) -> ZoneViewModel {
    let status = status_bucket(raw.moisture, raw.valve_open);
    ZoneViewModel {
        name: name.to_string(),
        moisture: raw.moisture,
        moisture_label: format!("{}%", raw.moisture),
        valve_open: raw.valve_open,
        flow_rate_lpm: raw.flow_rate,
        flow_rate_label: raw
            .flow_rate
            .map(|f| format!("{f} L/min"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        status,
        status_label: status.label(),
        recommendation_label: recommendation_label(raw),
        predicted_moisture: raw.predicted_moisture,
        confidence: raw.confidence,
    }
}

/// Adapt a whole `GET /zones` payload.  `BTreeMap` keeps cards in name order.
pub fn adapt_zones(raw: &BTreeMap<String, ZoneRecord>) -> Vec<ZoneViewModel> {
    raw.iter().map(|(name, z)| adapt_zone(name, z)).collect()
}

// ---------------------------------------------------------------------------
// Dashboard summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub zone_count: usize,
    pub average_moisture: Option<f64>,
    pub needs_irrigation: usize,
    pub irrigating: usize,
    pub total_flow_lpm: f64,
}

impl Summary {
    pub fn from_zones(zones: &[ZoneViewModel]) -> Self {
        let average_moisture = if zones.is_empty() {
            None
        } else {
            Some(zones.iter().map(|z| z.moisture).sum::<f64>() / zones.len() as f64)
        };

        Self {
            zone_count: zones.len(),
            average_moisture,
            needs_irrigation: zones
                .iter()
                .filter(|z| z.status == StatusBucket::NeedsIrrigation)
                .count(),
            irrigating: zones.iter().filter(|z| z.valve_open).count(),
            total_flow_lpm: zones.iter().filter_map(|z| z.flow_rate_lpm).sum(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
