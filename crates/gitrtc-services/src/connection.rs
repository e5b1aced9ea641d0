//! Connection capability seam.
//!
//! The negotiation engine never touches ICE, DTLS or media itself. It drives
//! an opaque [`PeerConnection`] (a WebRTC peer connection in production, an
//! in-memory double in tests) and reacts to the [`ConnectionEvent`]s it emits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use gitrtc_core::{IceCandidate, PeerId, SessionDescription};

/// `RTCSignalingState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "stable",
            Self::HaveLocalOffer => "have-local-offer",
            Self::HaveRemoteOffer => "have-remote-offer",
            Self::HaveLocalPranswer => "have-local-pranswer",
            Self::HaveRemotePranswer => "have-remote-pranswer",
            Self::Closed => "closed",
        })
    }
}

/// Argument to [`PeerConnection::set_local_description`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalDescription {
    Description(SessionDescription),
    /// Discard the in-progress offer and return to the last stable state.
    Rollback,
}

/// Notifications raised by a connection capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The capability wants a fresh offer sent to the remote side.
    NegotiationNeeded,
    /// A local ICE candidate was gathered.
    CandidateGenerated(IceCandidate),
    /// Diagnostic only.
    ConnectionStateChanged(String),
}

pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("operation invalid in signaling state {0}")]
    InvalidState(SignalingState),
    #[error("connection closed")]
    Closed,
    #[error("peer connections are not supported by this build")]
    Unsupported,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// One point-to-point connection, as far as signaling is concerned.
///
/// Descriptions and candidates are passed through untouched.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn set_local_description(&self, desc: LocalDescription) -> Result<(), ConnectionError>;

    async fn set_remote_description(&self, desc: SessionDescription)
        -> Result<(), ConnectionError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ConnectionError>;

    fn signaling_state(&self) -> SignalingState;

    /// Tear the connection down. Later calls fail with [`ConnectionError::Closed`].
    async fn close(&self);
}

/// Creates a connection capability for a remote peer, along with the stream
/// of events it will raise.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(
        &self,
        remote: &PeerId,
    ) -> Result<(Arc<dyn PeerConnection>, ConnectionEvents), ConnectionError>;
}
