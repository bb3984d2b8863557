//! WebSocket stream of cache events

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use ssp_core::{CacheEvent, ServiceListing};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::AppState;

/// Messages sent to the client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registered resources, sent on connect and on request
    Services { services: Vec<ServiceListing> },
    /// A cache change
    Cache { event: CacheEvent },
    Pong,
    Error { message: String },
}

/// Messages accepted from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RequestServices,
    Ping,
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            warn!("Failed to serialize websocket message: {}", e);
            None
        }
    }
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.router.cache().subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(16);

    let services = ServerMessage::Services {
        services: state.router.services(),
    };
    if let Some(message) = encode(&services) {
        if sender.send(message).await.is_err() {
            warn!("Failed to send service listing to WebSocket client");
            return;
        }
    }

    // Incoming client messages
    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => handle_client_message(message, &recv_state),
                        Err(e) => ServerMessage::Error {
                            message: format!("unrecognised message: {}", e),
                        },
                    };
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => {
                    debug!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    // Cache events and replies to the client
    let mut send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => ServerMessage::Cache { event },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged behind by {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };
            let Some(message) = encode(&outgoing) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                debug!("Failed to send message to WebSocket client");
                break;
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed");
}

/// Answer a client message
fn handle_client_message(msg: ClientMessage, state: &AppState) -> ServerMessage {
    match msg {
        ClientMessage::RequestServices => ServerMessage::Services {
            services: state.router.services(),
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_message_serialization() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"request_services"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::RequestServices));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"pong"}"#).is_err());
    }
}
