//! HTTP API handlers — exposes the signaling directory as JSON.

pub mod status;

use std::time::Instant;

use gitrtc_services::PeerDirectory;

pub use status::{handle_peers, handle_status, PeerInfo, PeersResponse, StatusResponse};

#[derive(Clone)]
pub struct ApiState {
    pub directory: PeerDirectory,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(directory: PeerDirectory) -> Self {
        Self {
            directory,
            started_at: Instant::now(),
        }
    }
}
