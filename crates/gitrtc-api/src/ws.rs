//! WebSocket transport for signaling sessions.
//!
//! One task per socket reads frames in order and feeds them to a
//! [`SignalingSession`]; a writer task drains the session's event queue onto
//! the socket. Per-message errors are logged and the socket stays open.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use gitrtc_core::SignalEvent;
use gitrtc_services::SignalingSession;

use crate::ApiState;

pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    let origins: Vec<String> = headers
        .get_all(header::ORIGIN)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect();
    ws.on_upgrade(move |socket| run_session(socket, state, origins))
}

async fn run_session(socket: WebSocket, state: ApiState, origins: Vec<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalEvent>();
    let mut session = SignalingSession::new(state.directory.clone(), tx, origins);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.encode() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(action = event.action(), error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let outcome = match result {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_text(text).await,
                Err(_) => {
                    tracing::warn!(peer = ?session.peer_id(), "dropping non-UTF-8 frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(peer = ?session.peer_id(), error = %e, "socket error");
                break;
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(peer = ?session.peer_id(), error = %e, "dropping signaling message");
        }
    }

    session.close().await;
    drop(session);
    let _ = writer.await;
}
