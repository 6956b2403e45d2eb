use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::FieldProfile;
use crate::debounce::Debouncer;
use crate::decision::{decide, Decision};
use crate::models::Action;
use crate::state::SharedState;

const INDEX_HTML: &str = include_str!("ui/index.html");

#[derive(Clone)]
pub struct AppContext {
    pub state: SharedState,
    pub api: ApiClient,
    pub refresh: Debouncer,
    pub field: FieldProfile,
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SimulateBody {
    pub moisture: f64,
}

#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub soil_moisture: f64,
    #[serde(default)]
    pub soil_moisture_lag1: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Remote,
    Simulated,
}

#[derive(Debug, Serialize)]
pub struct PredictAnswer {
    pub source: AnswerSource,
    pub action: Action,
    pub predicted_moisture: f64,
    pub recommended_valve_seconds: Option<f64>,
}

impl From<Decision> for PredictAnswer {
    fn from(d: Decision) -> Self {
        Self {
            source: AnswerSource::Simulated,
            action: d.action,
            predicted_moisture: d.predicted_moisture,
            recommended_valve_seconds: Some(f64::from(d.duration_seconds))
                .filter(|s| *s > 0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/zones", get(api_zones))
        .route("/api/history", get(api_history))
        .route("/api/weather", get(api_weather))
        .route("/api/simulate", post(api_simulate))
        .route("/api/predict", post(api_predict))
        .route("/api/refresh", post(api_refresh))
        .with_state(ctx)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_status(State(ctx): State<AppContext>) -> impl IntoResponse {
    let st = ctx.state.read().await;
    Json(st.to_status())
}

async fn api_zones(State(ctx): State<AppContext>) -> impl IntoResponse {
    let st = ctx.state.read().await;
    Json(st.zones_view())
}

async fn api_history(State(ctx): State<AppContext>) -> impl IntoResponse {
    let st = ctx.state.read().await;
    Json(st.history_view())
}

async fn api_weather(State(ctx): State<AppContext>) -> impl IntoResponse {
    let st = ctx.state.read().await;
    Json(st.weather_view())
}

async fn api_simulate(Json(body): Json<SimulateBody>) -> Json<Decision> {
    Json(decide(body.moisture))
}

/// Ask the remote model; answer with the local rule when it can't be reached.
async fn api_predict(
    State(ctx): State<AppContext>,
    Json(body): Json<PredictBody>,
) -> Json<PredictAnswer> {
    let req = ctx.field.request(body.soil_moisture, body.soil_moisture_lag1);
    match ctx.api.predict(&req).await {
        Ok(resp) => Json(PredictAnswer {
            source: AnswerSource::Remote,
            action: resp.action,
            predicted_moisture: resp.predicted_moisture,
            recommended_valve_seconds: resp.recommended_valve_seconds,
        }),
        Err(e) => {
            warn!("predict failed, answering with local rule: {e:#}");
            ctx.state
                .write()
                .await
                .record_error(format!("predict failed: {e:#}"));
            Json(decide(body.soil_moisture).into())
        }
    }
}

async fn api_refresh(State(ctx): State<AppContext>) -> StatusCode {
    ctx.refresh.trigger();
    StatusCode::ACCEPTED
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(ctx: AppContext, port: u16, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("web ui listening on http://{addr}");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
