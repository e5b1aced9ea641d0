//! /status and /peers handlers.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Registered signaling sessions.
    pub peers: usize,
    pub uptime_secs: u64,
    pub version: String,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        peers: state.directory.len().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
    pub origins: Vec<String>,
    pub connected_secs: u64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state
        .directory
        .entries()
        .await
        .into_iter()
        .map(|e| PeerInfo {
            id: e.peer.id.to_string(),
            name: e.peer.name,
            origins: e.origins,
            connected_secs: e.connected_at.elapsed().as_secs(),
        })
        .collect();

    Json(PeersResponse { peers })
}
