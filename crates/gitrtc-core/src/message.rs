//! Signaling wire schema.
//!
//! Two disjoint message families travel over the signaling socket as JSON
//! text frames, both tagged by `action`:
//!
//! - [`SignalRequest`]: client → server
//! - [`SignalEvent`]:   server → client
//!
//! Session descriptions and ICE candidates are opaque to the relay and are
//! round-tripped verbatim, unknown members included. Only the description
//! `type` is ever inspected, by the negotiation engine on the receiving end.

use serde::{Deserialize, Serialize};

use crate::peer::{Peer, PeerId};

// ── Negotiation payloads ──────────────────────────────────────────────────────

/// `RTCSdpType` as it appears in a session description's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    /// Any other members, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: Some(sdp.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: Some(sdp.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// An `RTCIceCandidateInit`, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

/// What one endpoint sends another through the relay.
///
/// Exactly one of `description` / `candidate` is present on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "RawPeerMessage")]
pub enum PeerMessageInit {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

impl PeerMessageInit {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Description(d) => match d.sdp_type {
                SdpType::Offer => "offer",
                SdpType::Answer => "answer",
                SdpType::Pranswer => "pranswer",
                SdpType::Rollback => "rollback",
            },
            Self::Candidate(_) => "candidate",
        }
    }
}

#[derive(Deserialize)]
struct RawPeerMessage {
    #[serde(default)]
    description: Option<SessionDescription>,
    #[serde(default)]
    candidate: Option<IceCandidate>,
}

impl TryFrom<RawPeerMessage> for PeerMessageInit {
    type Error = CodecError;

    fn try_from(raw: RawPeerMessage) -> Result<Self, Self::Error> {
        match (raw.description, raw.candidate) {
            (Some(d), None) => Ok(Self::Description(d)),
            (None, Some(c)) => Ok(Self::Candidate(c)),
            _ => Err(CodecError::AmbiguousPayload),
        }
    }
}

/// A relayed [`PeerMessageInit`] annotated with the recipient's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(flatten)]
    pub init: PeerMessageInit,
    /// True when the recipient is the polite side of the pair.
    pub is_polite: bool,
}

// ── Client → server ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SignalRequest {
    /// Must be the first message on a connection.
    Handshake { name: String },
    FetchPeerList,
    Offer {
        peer_id: PeerId,
        message: PeerMessageInit,
    },
}

impl SignalRequest {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::FetchPeerList => "fetch-peer-list",
            Self::Offer { .. } => "offer",
        }
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Server → client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SignalEvent {
    NewPeer {
        peer: Peer,
        /// Directory size at the instant this event was built.
        peer_cnt: usize,
    },
    DeletePeer {
        peer_id: PeerId,
        peer_cnt: usize,
    },
    FullPeerList {
        peers: Vec<Peer>,
    },
    ReceiveOffer {
        peer_id: PeerId,
        message: PeerMessage,
    },
}

impl SignalEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::NewPeer { .. } => "new-peer",
            Self::DeletePeer { .. } => "delete-peer",
            Self::FullPeerList { .. } => "full-peer-list",
            Self::ReceiveOffer { .. } => "receive-offer",
        }
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("peer message must carry exactly one of `description` or `candidate`")]
    AmbiguousPayload,
}
