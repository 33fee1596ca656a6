//! WebSocket stream of queue events for live clients.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use mediamill_core::QueueEvent;

use crate::state::AppState;

/// Interval between heartbeat frames.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Heartbeat {
    Heartbeat { timestamp: i64 },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection: queue events are forwarded as JSON
/// text frames, with a periodic heartbeat to keep the connection alive.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.queue().subscribe();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // The first tick fires immediately.
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if !send_event(&mut sender, &event).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Events are snapshots; a lagged client catches
                            // up on the next one.
                            warn!("WebSocket client lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Queue event channel closed");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let beat = Heartbeat::Heartbeat {
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    match serde_json::to_string(&beat) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialize heartbeat: {}", e),
                    }
                }
            }
        }
    });

    // Clients only send ping/close; anything else is logged and ignored.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    info!("WebSocket client disconnected");
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &QueueEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize queue event: {}", e);
            true
        }
    }
}
