//! Live prediction feed over WebSocket.  Each message is one JSON
//! `PredictionRecord`; valid records are merged into the history and
//! schedule a debounced zone refresh.

use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::models::PredictionRecord;
use crate::state::SharedState;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Message parsing
// ---------------------------------------------------------------------------

pub(crate) fn parse_message(payload: &[u8]) -> Result<PredictionRecord, serde_json::Error> {
    serde_json::from_slice(payload)
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

/// Stay subscribed to `url` until cancelled, reconnecting after `reconnect`
/// whenever the connection fails or closes.
pub async fn run(
    url: String,
    shared: SharedState,
    refresh: Debouncer,
    reconnect: Duration,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            r = connect_async(url.as_str()) => r,
        };

        match connected {
            Ok((stream, _response)) => {
                info!(%url, "feed connected");
                shared.write().await.set_feed_connected(true);
                consume(stream, &shared, &refresh, &cancel).await;
                shared.write().await.set_feed_connected(false);
            }
            Err(e) => {
                warn!(%url, "feed connect failed: {e}. retrying...");
                shared
                    .write()
                    .await
                    .record_error(format!("feed connect failed: {e}"));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect) => {}
        }
    }
    info!("feed stopped");
}

async fn consume(
    mut stream: FeedStream,
    shared: &SharedState,
    refresh: &Debouncer,
    cancel: &CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                handle_payload(text.as_bytes(), shared, refresh, cancel).await
            }
            Some(Ok(Message::Binary(bytes))) => {
                handle_payload(&bytes, shared, refresh, cancel).await
            }
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "feed closed by server");
                return;
            }
            Some(Ok(_)) => {} // ping / pong
            Some(Err(e)) => {
                warn!("feed error: {e}");
                shared.write().await.record_error(format!("feed error: {e}"));
                return;
            }
            None => {
                debug!("feed stream ended");
                return;
            }
        }
    }
}

async fn handle_payload(
    payload: &[u8],
    shared: &SharedState,
    refresh: &Debouncer,
    cancel: &CancellationToken,
) {
    match parse_message(payload) {
        Ok(record) => {
            if cancel.is_cancelled() {
                return;
            }
            debug!(id = %record.id, timestamp = %record.timestamp, "feed prediction");
            shared.write().await.push_prediction(record);
            refresh.trigger();
        }
        Err(e) => {
            warn!("bad feed json: {e}");
            shared
                .write()
                .await
                .record_error(format!("bad feed json: {e}"));
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
