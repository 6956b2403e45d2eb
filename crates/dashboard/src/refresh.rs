//! Fetch-and-apply for each data source.  Sources are independent: a failed
//! fetch is logged and recorded on its own source and never blocks the
//! others.  Results that arrive after cancellation are dropped.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::state::SharedState;
use crate::zone::adapt_zones;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Zones,
    Weather,
    History,
}

#[derive(Clone)]
pub struct Refresher {
    api: ApiClient,
    shared: SharedState,
    cancel: CancellationToken,
}

impl Refresher {
    pub fn new(api: ApiClient, shared: SharedState, cancel: CancellationToken) -> Self {
        Self {
            api,
            shared,
            cancel,
        }
    }

    /// Run `fut` unless cancelled first; `None` means the result must not be
    /// applied.
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => (!self.cancel.is_cancelled()).then_some(out),
        }
    }

    pub async fn zones(&self) {
        let Some(result) = self.guarded(self.api.fetch_zones()).await else {
            debug!(source = "zones", "refresh cancelled");
            return;
        };
        let mut st = self.shared.write().await;
        match result {
            Ok(raw) => {
                let zones = adapt_zones(&raw);
                debug!(zones = zones.len(), "zones refreshed");
                st.apply_zones(zones);
            }
            Err(e) => {
                warn!(source = "zones", "refresh failed: {e:#}");
                st.fail_zones(format!("{e:#}"));
            }
        }
    }

    pub async fn weather(&self) {
        let Some(result) = self.guarded(self.api.fetch_weather()).await else {
            debug!(source = "weather", "refresh cancelled");
            return;
        };
        let mut st = self.shared.write().await;
        match result {
            Ok(weather) => st.apply_weather(weather),
            Err(e) => {
                warn!(source = "weather", "refresh failed: {e:#}");
                st.fail_weather(format!("{e:#}"));
            }
        }
    }

    pub async fn history(&self) {
        let Some(result) = self.guarded(self.api.fetch_history()).await else {
            debug!(source = "history", "refresh cancelled");
            return;
        };
        let mut st = self.shared.write().await;
        match result {
            Ok(records) => {
                debug!(records = records.len(), "history refreshed");
                st.apply_history(records);
            }
            Err(e) => {
                warn!(source = "history", "refresh failed: {e:#}");
                st.fail_history(format!("{e:#}"));
            }
        }
    }

    pub async fn refresh(&self, target: Target) {
        match target {
            Target::Zones => self.zones().await,
            Target::Weather => self.weather().await,
            Target::History => self.history().await,
        }
    }

    /// Fetch every source concurrently; each settles on its own.
    pub async fn refresh_all(&self) {
        tokio::join!(self.zones(), self.weather(), self.history());
    }

    /// Re-fetch `target` every `every` until cancelled.  The first tick is
    /// skipped because startup already ran `refresh_all`.
    pub async fn poll(self, target: Target, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(?target, every_sec = every.as_secs(), "poller started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.refresh(target).await,
            }
        }
        debug!(?target, "poller stopped");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
