//! Signaling session — the server side of one client socket.
//!
//! The transport feeds inbound text frames to [`SignalingSession::handle_text`]
//! and drains the session's [`EventSender`] queue back onto the socket. Errors
//! returned here are per-message: the caller logs them and keeps reading.

use gitrtc_core::{CodecError, PeerId, SignalRequest};

use crate::directory::{DirectoryError, EventSender, PeerDirectory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no handshake yet.
    Unregistered,
    Registered(PeerId),
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("`{0}` before handshake")]
    HandshakeRequired(&'static str),
    #[error("handshake on an already registered session")]
    AlreadyRegistered,
    #[error("session closed")]
    Closed,
    #[error(transparent)]
    Schema(#[from] CodecError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub struct SignalingSession {
    directory: PeerDirectory,
    sender: EventSender,
    origins: Vec<String>,
    state: SessionState,
}

impl SignalingSession {
    pub fn new(directory: PeerDirectory, sender: EventSender, origins: Vec<String>) -> Self {
        Self {
            directory,
            sender,
            origins,
            state: SessionState::Unregistered,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn peer_id(&self) -> Option<&PeerId> {
        match &self.state {
            SessionState::Registered(id) => Some(id),
            _ => None,
        }
    }

    /// Decode and dispatch one inbound frame.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        let request = SignalRequest::decode(text)?;
        self.handle_request(request).await
    }

    pub async fn handle_request(&mut self, request: SignalRequest) -> Result<(), SessionError> {
        let registered = match &self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Unregistered => None,
            SessionState::Registered(id) => Some(id.clone()),
        };

        match (registered, request) {
            (None, SignalRequest::Handshake { name }) => {
                let (peer, _) = self
                    .directory
                    .register(name, self.sender.clone(), self.origins.clone())
                    .await;
                self.state = SessionState::Registered(peer.id);
                Ok(())
            }
            (None, other) => Err(SessionError::HandshakeRequired(other.action())),
            (Some(_), SignalRequest::Handshake { .. }) => Err(SessionError::AlreadyRegistered),
            (Some(id), SignalRequest::FetchPeerList) => {
                self.directory.send_snapshot(&id).await;
                Ok(())
            }
            (Some(id), SignalRequest::Offer { peer_id, message }) => {
                self.directory.relay(&id, &peer_id, message).await?;
                Ok(())
            }
        }
    }

    /// Deregister (if registered) and refuse further input. Safe to call
    /// more than once.
    pub async fn close(&mut self) {
        let prev = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Registered(id) = prev {
            self.directory.deregister(&id).await;
        }
    }
}
