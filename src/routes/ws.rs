//! Push channel for anomaly events.
//!
//! `GET /ws/anomalies` upgrades to a WebSocket and forwards every anomaly
//! event the coordinator publishes as one JSON text frame. A client that
//! falls behind the broadcast buffer skips the missed updates.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, warn};

use super::AppState;
use crate::FeedUpdate;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/anomalies", get(handler))
}

async fn handler(ws: WebSocketUpgrade, State(coordinator): State<AppState>) -> impl IntoResponse {
    let updates = coordinator.subscribe();
    ws.on_upgrade(move |socket| forward_anomalies(socket, updates))
}

async fn forward_anomalies(mut socket: WebSocket, mut updates: Receiver<FeedUpdate>) {
    // ---
    debug!("Anomaly subscriber connected");
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Anomaly subscriber lagged, skipped {} update(s)", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        for event in &update.events {
            let text = match serde_json::to_string(event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode anomaly event {}: {}", event.seq, e);
                    continue;
                }
            };
            if socket.send(Message::Text(text.into())).await.is_err() {
                debug!("Anomaly subscriber disconnected");
                return;
            }
        }
    }
}
