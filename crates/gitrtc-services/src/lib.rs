//! gitrtc-services — signaling relay and peer negotiation.
//!
//! Server side: [`PeerDirectory`] and one [`SignalingSession`] per socket.
//! Client side: [`DirectoryMirror`] owning one [`NegotiationSession`] per
//! remote peer, driving a [`PeerConnection`] capability.

pub mod connection;
pub mod directory;
pub mod mirror;
pub mod mock;
pub mod negotiation;
pub mod session;

pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, LocalDescription,
    PeerConnection, SignalingState,
};
pub use directory::{DirectoryEntry, DirectoryError, EventSender, PeerDirectory};
pub use mirror::{DirectoryMirror, MirrorEntry, MirrorError};
pub use negotiation::{NegotiationSession, Negotiator};
pub use session::{SessionError, SessionState, SignalingSession};
