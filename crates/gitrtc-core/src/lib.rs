//! gitrtc-core — wire schema, peer identity, and configuration.
//! All other git-rtc crates depend on this one.

pub mod config;
pub mod message;
pub mod peer;

pub use message::{
    CodecError, IceCandidate, PeerMessage, PeerMessageInit, SdpType, SessionDescription,
    SignalEvent, SignalRequest,
};
pub use peer::{Peer, PeerId};
