mod api;
mod config;
mod debounce;
mod decision;
mod feed;
mod history;
mod models;
mod refresh;
mod state;
mod web;
mod zone;

use anyhow::Result;
use std::{env, path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::ApiClient;
use debounce::Debouncer;
use refresh::{Refresher, Target};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path =
        PathBuf::from(env::var("CONFIG_PATH").unwrap_or_else(|_| "dashboard.toml".to_string()));
    let cfg = config::load(&config_path)?;
    info!(
        base_url = %cfg.api.base_url,
        feed = cfg.api.feed_url.as_deref().unwrap_or("-"),
        "config loaded"
    );

    // ── Shared state ────────────────────────────────────────────────
    let shared = state::shared();
    shared
        .write()
        .await
        .record_system("dashboard started".to_string());

    let cancel = CancellationToken::new();
    let api = ApiClient::new(&cfg.api)?;
    let refresher = Refresher::new(api.clone(), Arc::clone(&shared), cancel.clone());

    // ── Debounced zone refresh (feed events, /api/refresh) ──────────
    let r = refresher.clone();
    let (debouncer, debounce_task) =
        Debouncer::spawn(cfg.polling.debounce(), cancel.clone(), move || {
            let r = r.clone();
            async move { r.zones().await }
        });

    let mut tasks = vec![debounce_task];

    // ── Initial fetch + pollers ─────────────────────────────────────
    {
        let r = refresher.clone();
        tasks.push(tokio::spawn(async move { r.refresh_all().await }));
    }
    for (target, secs) in [
        (Target::Zones, cfg.polling.zones_sec),
        (Target::History, cfg.polling.history_sec),
        (Target::Weather, cfg.polling.weather_sec),
    ] {
        tasks.push(tokio::spawn(
            refresher.clone().poll(target, Duration::from_secs(secs)),
        ));
    }

    // ── Live feed ───────────────────────────────────────────────────
    match cfg.api.feed_url.clone() {
        Some(url) => tasks.push(tokio::spawn(feed::run(
            url,
            Arc::clone(&shared),
            debouncer.clone(),
            Duration::from_secs(cfg.polling.feed_reconnect_sec),
            cancel.clone(),
        ))),
        None => warn!("no api.feed_url configured; live predictions disabled"),
    }

    // ── Shutdown on Ctrl-C ──────────────────────────────────────────
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
                cancel.cancel();
            }
        });
    }

    // ── Web server ──────────────────────────────────────────────────
    let ctx = web::AppContext {
        state: Arc::clone(&shared),
        api,
        refresh: debouncer,
        field: cfg.field.clone(),
    };
    let result = web::serve(ctx, cfg.web.port, cancel.clone()).await;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!("background task ended abnormally: {e}");
        }
    }
    result
}
