use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::history::{History, HistoryEntry};
use crate::models::{PredictionRecord, WeatherReport};
use crate::zone::{Summary, ZoneViewModel};

/// Maximum number of events retained in the activity ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<DashboardState>>;

pub fn shared() -> SharedState {
    Arc::new(RwLock::new(DashboardState::new()))
}

// ---------------------------------------------------------------------------
// Per-source state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Loaded,
    Failed,
}

/// One independently-fetched data source.  A failure after a successful load
/// keeps the last good data and only records the error.
#[derive(Debug, Clone)]
pub struct Source<T> {
    data: Option<T>,
    updated_at: Option<OffsetDateTime>,
    last_error: Option<String>,
}

impl<T> Default for Source<T> {
    fn default() -> Self {
        Self {
            data: None,
            updated_at: None,
            last_error: None,
        }
    }
}

impl<T> Source<T> {
    pub fn phase(&self) -> Phase {
        match (&self.data, &self.last_error) {
            (Some(_), _) => Phase::Loaded,
            (None, Some(_)) => Phase::Failed,
            (None, None) => Phase::Loading,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.updated_at = Some(OffsetDateTime::now_utc());
        self.last_error = None;
    }

    fn fail(&mut self, error: String) {
        self.last_error = Some(error);
    }

    fn view<U>(&self, f: impl FnOnce(&T) -> U) -> SourceView<U> {
        SourceView {
            phase: self.phase(),
            data: self.data.as_ref().map(f),
            updated_at: self.updated_at,
            last_error: self.last_error().map(str::to_owned),
        }
    }
}

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub started_at: Instant,
    pub feed_connected: bool,
    pub zones: Source<Vec<ZoneViewModel>>,
    pub weather: Source<WeatherReport>,
    pub history: Source<History>,
    pub events: VecDeque<ActivityEvent>,
}

#[derive(Clone, Serialize)]
pub struct ActivityEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Feed,
    Refresh,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON responses (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SourceView<T> {
    pub phase: Phase,
    pub data: Option<T>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub feed_connected: bool,
    pub summary: Summary,
    pub zones: SourceView<Vec<ZoneViewModel>>,
    pub weather: SourceView<WeatherReport>,
    pub history: SourceView<Vec<HistoryEntry>>,
    pub events: Vec<ActivityEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            feed_connected: false,
            zones: Source::default(),
            weather: Source::default(),
            history: Source::default(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn apply_zones(&mut self, zones: Vec<ZoneViewModel>) {
        let detail = format!("zones refreshed ({})", zones.len());
        self.zones.succeed(zones);
        self.push_event(EventKind::Refresh, detail);
    }

    pub fn apply_weather(&mut self, weather: WeatherReport) {
        self.weather.succeed(weather);
        self.push_event(EventKind::Refresh, "weather refreshed".to_string());
    }

    /// Fold a fetched history into the held one; live feed records the
    /// fetch doesn't include yet survive.
    pub fn apply_history(&mut self, records: Vec<PredictionRecord>) {
        let mut history = self.history.data.take().unwrap_or_default();
        history.merge_fetched(records);
        let detail = format!("history refreshed ({})", history.len());
        self.history.succeed(history);
        self.push_event(EventKind::Refresh, detail);
    }

    /// Merge one live prediction from the feed into the history.
    pub fn push_prediction(&mut self, record: PredictionRecord) {
        let detail = format!(
            "prediction {} at {}",
            String::from(record.action.clone()),
            if record.timestamp.is_empty() {
                "?"
            } else {
                record.timestamp.as_str()
            }
        );

        let mut history = self.history.data.take().unwrap_or_default();
        history.push(record);
        self.history.data = Some(history);
        self.history.updated_at = Some(OffsetDateTime::now_utc());

        self.push_event(EventKind::Feed, detail);
    }

    pub fn fail_zones(&mut self, error: String) {
        self.zones.fail(error.clone());
        self.record_error(format!("zones: {error}"));
    }

    pub fn fail_weather(&mut self, error: String) {
        self.weather.fail(error.clone());
        self.record_error(format!("weather: {error}"));
    }

    pub fn fail_history(&mut self, error: String) {
        self.history.fail(error.clone());
        self.record_error(format!("history: {error}"));
    }

    pub fn set_feed_connected(&mut self, connected: bool) {
        if self.feed_connected == connected {
            return;
        }
        self.feed_connected = connected;
        let detail = if connected {
            "feed connected"
        } else {
            "feed disconnected"
        };
        self.push_event(EventKind::Feed, detail.to_string());
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    pub fn summary(&self) -> Summary {
        Summary::from_zones(self.zones.data().map(Vec::as_slice).unwrap_or_default())
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            feed_connected: self.feed_connected,
            summary: self.summary(),
            zones: self.zones_view(),
            weather: self.weather_view(),
            history: self.history_view(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    pub fn zones_view(&self) -> SourceView<Vec<ZoneViewModel>> {
        self.zones.view(Clone::clone)
    }

    pub fn weather_view(&self) -> SourceView<WeatherReport> {
        self.weather.view(Clone::clone)
    }

    pub fn history_view(&self) -> SourceView<Vec<HistoryEntry>> {
        self.history.view(History::entries)
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ActivityEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HISTORY_LIMIT;
    use crate::models::{Action, ZoneRecord};
    use crate::zone::adapt_zone;

    fn zone(name: &str, moisture: f64) -> ZoneViewModel {
        adapt_zone(
            name,
            &ZoneRecord {
                moisture,
                valve_open: false,
                flow_rate: None,
                last_decision: None,
                recommended_seconds: None,
                predicted_moisture: None,
                confidence: None,
            },
        )
    }

    fn prediction(id: &str) -> PredictionRecord {
        PredictionRecord {
            id: id.to_string(),
            timestamp: "2024-01-01T10:00:00".to_string(),
            input_moisture: Some(30.0),
            action: Action::Irrigate,
            recommended_seconds: Some(120.0),
            predicted_moisture: None,
        }
    }

    #[test]
    fn sources_start_loading() {
        let st = DashboardState::new();
        assert_eq!(st.zones.phase(), Phase::Loading);
        assert_eq!(st.weather.phase(), Phase::Loading);
        assert_eq!(st.history.phase(), Phase::Loading);
    }

    #[test]
    fn failure_before_load_is_failed() {
        let mut st = DashboardState::new();
        st.fail_weather("timeout".into());
        assert_eq!(st.weather.phase(), Phase::Failed);
        assert_eq!(st.weather.last_error(), Some("timeout"));
        // other sources unaffected
        assert_eq!(st.zones.phase(), Phase::Loading);
    }

    #[test]
    fn failure_after_load_keeps_data() {
        let mut st = DashboardState::new();
        st.apply_zones(vec![zone("Zone A", 42.0)]);
        st.fail_zones("connection refused".into());
        assert_eq!(st.zones.phase(), Phase::Loaded);
        assert_eq!(st.zones.data().unwrap().len(), 1);
        assert_eq!(st.zones.last_error(), Some("connection refused"));
    }

    #[test]
    fn success_clears_error() {
        let mut st = DashboardState::new();
        st.fail_zones("boom".into());
        st.apply_zones(vec![]);
        assert_eq!(st.zones.phase(), Phase::Loaded);
        assert_eq!(st.zones.last_error(), None);
    }

    #[test]
    fn push_prediction_creates_history() {
        let mut st = DashboardState::new();
        st.push_prediction(prediction("a"));
        assert_eq!(st.history.phase(), Phase::Loaded);
        assert_eq!(st.history.data().unwrap().latest().unwrap().id, "a");
    }

    #[test]
    fn push_prediction_caps_history() {
        let mut st = DashboardState::new();
        st.apply_history(vec![prediction("seed")]);
        for i in 0..20 {
            st.push_prediction(prediction(&i.to_string()));
        }
        let h = st.history.data().unwrap();
        assert_eq!(h.len(), HISTORY_LIMIT);
        assert_eq!(h.latest().unwrap().id, "19");
    }

    #[test]
    fn history_poll_keeps_newer_feed_record() {
        let mut st = DashboardState::new();
        let mut older = prediction("a");
        older.timestamp = "2024-01-01T09:00:00".to_string();
        st.apply_history(vec![older.clone()]);

        let mut live = prediction("live");
        live.timestamp = "2024-01-01T10:00:00Z".to_string();
        st.push_prediction(live);
        st.apply_history(vec![older]);

        let ids: Vec<String> = st
            .history
            .data()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(ids, vec!["live", "a"]);
    }

    #[test]
    fn feed_connectivity_logged_on_change_only() {
        let mut st = DashboardState::new();
        st.set_feed_connected(true);
        st.set_feed_connected(true);
        st.set_feed_connected(false);
        let feed_events = st.events.iter().filter(|e| e.kind == EventKind::Feed).count();
        assert_eq!(feed_events, 2);
    }

    #[test]
    fn events_ring_is_bounded() {
        let mut st = DashboardState::new();
        for i in 0..(MAX_EVENTS + 50) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        assert_eq!(st.events.front().unwrap().detail, "event 50");
    }

    #[test]
    fn status_snapshot_shape() {
        let mut st = DashboardState::new();
        st.apply_zones(vec![zone("Zone A", 42.0), zone("Zone C", 28.0)]);
        st.fail_weather("503".into());
        st.push_prediction(prediction("p1"));

        let json = serde_json::to_value(st.to_status()).unwrap();
        assert_eq!(json["zones"]["phase"], "loaded");
        assert_eq!(json["zones"]["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["weather"]["phase"], "failed");
        assert!(json["weather"]["data"].is_null());
        assert_eq!(json["history"]["data"][0]["id"], "p1");
        assert_eq!(
            json["history"]["data"][0]["display_time"],
            "2024-01-01 10:00:00 UTC"
        );
        assert_eq!(json["summary"]["needs_irrigation"], 1);
        // newest event first
        assert_eq!(json["events"][0]["kind"], "feed");
    }
}
