//! WebSocket subscription to a published channel.
use crate::publisher::channel_matches;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    channel: Option<String>,
    route_id: Option<String>,
}

/// Handler for WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    let channel = params
        .channel
        .unwrap_or_else(|| state.config().alerts_channel.clone());
    let route_filter = params.route_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, channel, route_filter))
        .into_response()
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    channel: String,
    route_filter: Option<String>,
) {
    let mut rx = state.publisher().subscribe();
    let mut shutdown = state.subscribe_shutdown();
    tracing::debug!("Subscriber joined channel '{}'", channel);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(msg) => {
                        if !channel_matches(&channel, &msg.channel) {
                            continue;
                        }
                        if let Some(route_id) = route_filter.as_deref() {
                            if msg.route_id.as_deref() != Some(route_id) {
                                continue;
                            }
                        }
                        if socket.send(Message::Text(msg.payload.as_ref().to_owned())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscriber on '{}' lagged, skipped {} event(s)", channel, skipped);
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }

    tracing::debug!("Subscriber left channel '{}'", channel);
}
