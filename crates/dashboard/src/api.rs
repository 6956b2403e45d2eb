//! HTTP client for the remote prediction / zone-status API.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ApiSection;
use crate::models::{PredictRequest, PredictResponse, PredictionRecord, WeatherReport, ZoneRecord};

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    history_path: String,
}

impl ApiClient {
    pub fn new(cfg: &ApiSection) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(concat!("irrigation-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            history_path: cfg.history_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;

        resp.json::<T>()
            .await
            .with_context(|| format!("GET {url}: malformed response body"))
    }

    /// `GET /zones` — zone name to record.
    pub async fn fetch_zones(&self) -> Result<BTreeMap<String, ZoneRecord>> {
        self.get_json("/zones").await
    }

    /// `GET /predictions/history` (or whatever `history_path` is set to).
    pub async fn fetch_history(&self) -> Result<Vec<PredictionRecord>> {
        self.get_json(&self.history_path).await
    }

    pub async fn fetch_weather(&self) -> Result<WeatherReport> {
        self.get_json("/weather").await
    }

    pub async fn predict(&self, req: &PredictRequest) -> Result<PredictResponse> {
        let url = self.url("/predict");
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} returned an error status"))?;

        resp.json::<PredictResponse>()
            .await
            .with_context(|| format!("POST {url}: malformed response body"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Action;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub(crate) async fn spawn_backend(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub(crate) fn client_for(base_url: &str) -> ApiClient {
        ApiClient::new(&ApiSection {
            base_url: base_url.to_string(),
            timeout_ms: 2_000,
            ..ApiSection::default()
        })
        .unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let api = client_for("http://example.test/");
        assert_eq!(api.url("/zones"), "http://example.test/zones");
        assert_eq!(api.url("zones"), "http://example.test/zones");
    }

    #[tokio::test]
    async fn fetch_zones_parses_map() {
        let router = Router::new().route(
            "/zones",
            get(|| async {
                Json(json!({
                    "Zone B": {"moisture": 68, "valve_open": false, "flow_rate": 0},
                    "Zone A": {"moisture": 42, "valve_open": true, "flow_rate": 12,
                               "last_decision": "IRRIGATE", "recommended_seconds": 90}
                }))
            }),
        );
        let api = client_for(&spawn_backend(router).await);

        let zones = api.fetch_zones().await.unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.keys().next().unwrap(), "Zone A");
        assert_eq!(zones["Zone A"].recommended_seconds, Some(90.0));
    }

    #[tokio::test]
    async fn fetch_history_uses_configured_path() {
        let router = Router::new().route(
            "/history",
            get(|| async { Json(json!([{"timestamp": "2024-01-01T10:00:00", "action": "NONE"}])) }),
        );
        let base = spawn_backend(router).await;
        let api = ApiClient::new(&ApiSection {
            base_url: base,
            history_path: "/history".into(),
            ..ApiSection::default()
        })
        .unwrap();

        let history = api.fetch_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, Action::NoOp);
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let router = Router::new().route(
            "/weather",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let api = client_for(&spawn_backend(router).await);

        let err = api.fetch_weather().await.unwrap_err();
        assert!(format!("{err:#}").contains("/weather"));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let router = Router::new().route("/zones", get(|| async { "not json" }));
        let api = client_for(&spawn_backend(router).await);

        let err = api.fetch_zones().await.unwrap_err();
        assert!(format!("{err:#}").contains("malformed"));
    }

    #[tokio::test]
    async fn predict_posts_body() {
        let router = Router::new().route(
            "/predict",
            post(|Json(req): Json<PredictRequest>| async move {
                Json(json!({
                    "action": if req.soil_moisture < 35.0 { "IRRIGATE" } else { "WAIT" },
                    "predicted_moisture": req.soil_moisture + 1.0,
                    "recommended_valve_seconds": 60
                }))
            }),
        );
        let api = client_for(&spawn_backend(router).await);

        let resp = api
            .predict(&PredictRequest {
                soil_moisture: 30.0,
                soil_moisture_lag1: 31.0,
                latitude: 0.0,
                longitude: 0.0,
                soil_type: "loam".into(),
                slope: 0.0,
                crop_kc: 1.0,
                calibration_factor: 1.0,
            })
            .await
            .unwrap();
        assert_eq!(resp.action, Action::Irrigate);
        assert_eq!(resp.predicted_moisture, 31.0);
        assert_eq!(resp.recommended_valve_seconds, Some(60.0));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = client_for(&format!("http://{addr}"));
        assert!(api.fetch_zones().await.is_err());
    }
}
