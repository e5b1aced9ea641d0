//! Peer identity and the pairwise role rule.
//!
//! Ids are opaque tokens assigned by the signaling server at handshake time.
//! They are compared as plain strings; that total order is what decides which
//! side of a pair yields during an offer collision.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Random bytes in a freshly allocated peer id (hex encoded on the wire).
pub const PEER_ID_BYTES: usize = 16;

/// Opaque, server-assigned peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a new random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PEER_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is `self` the polite side when talking to `other`?
    ///
    /// `self` is polite iff it sorts strictly after `other`. For distinct ids
    /// exactly one side of the pair is polite. Equal ids have no defined role
    /// and callers must reject them before asking.
    pub fn is_polite_towards(&self, other: &PeerId) -> bool {
        self > other
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A directory member as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
