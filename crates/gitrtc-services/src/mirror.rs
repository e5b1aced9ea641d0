//! Client-side mirror of the server's peer directory.
//!
//! Applies directory events in arrival order and owns one
//! [`NegotiationSession`] per peer that has been connected to. The mirror
//! includes the local client itself in its size (the server never tells a
//! client its own id), so a consistent mirror holds `peer_cnt - 1` entries.
//! Any disagreement triggers a single `fetch-peer-list`; the next
//! `full-peer-list` repairs the view.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use gitrtc_core::{Peer, PeerId, PeerMessage, SignalEvent, SignalRequest};

use crate::connection::{ConnectionError, ConnectionFactory};
use crate::negotiation::NegotiationSession;

pub enum MirrorEntry {
    /// Listed by the server; no connection attempted yet.
    Known(Peer),
    Connected(Peer, NegotiationSession),
}

impl MirrorEntry {
    pub fn peer(&self) -> &Peer {
        match self {
            Self::Known(p) | Self::Connected(p, _) => p,
        }
    }

    fn rename(&mut self, name: String) {
        match self {
            Self::Known(p) | Self::Connected(p, _) => p.name = name,
        }
    }

    async fn close(self) {
        if let Self::Connected(_, session) = self {
            session.close().await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("peer {0} is not in the directory")]
    UnknownPeer(PeerId),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

pub struct DirectoryMirror {
    entries: HashMap<PeerId, MirrorEntry>,
    requests: mpsc::UnboundedSender<SignalRequest>,
    factory: Arc<dyn ConnectionFactory>,
}

impl DirectoryMirror {
    /// `requests` is the outbound queue of the signaling socket; negotiation
    /// sessions send through it too.
    pub fn new(
        requests: mpsc::UnboundedSender<SignalRequest>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            requests,
            factory,
        }
    }

    pub async fn apply(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::FullPeerList { peers } => self.replace_all(peers).await,
            SignalEvent::NewPeer { peer, peer_cnt } => {
                match self.entries.get_mut(&peer.id) {
                    Some(entry) => entry.rename(peer.name),
                    None => {
                        tracing::info!(peer = %peer.id, name = %peer.name, "peer appeared");
                        self.entries.insert(peer.id.clone(), MirrorEntry::Known(peer));
                    }
                }
                self.check_count(peer_cnt);
            }
            SignalEvent::DeletePeer { peer_id, peer_cnt } => {
                if let Some(entry) = self.entries.remove(&peer_id) {
                    tracing::info!(peer = %peer_id, name = %entry.peer().name, "peer went away");
                    entry.close().await;
                }
                self.check_count(peer_cnt);
            }
            SignalEvent::ReceiveOffer { peer_id, message } => self.route(peer_id, message).await,
        }
    }

    async fn replace_all(&mut self, peers: Vec<Peer>) {
        let mut old = std::mem::take(&mut self.entries);
        for peer in peers {
            let entry = match old.remove(&peer.id) {
                Some(mut entry) => {
                    entry.rename(peer.name.clone());
                    entry
                }
                None => MirrorEntry::Known(peer.clone()),
            };
            self.entries.insert(peer.id, entry);
        }
        for (id, entry) in old {
            tracing::debug!(peer = %id, "dropped by full peer list");
            entry.close().await;
        }
        tracing::debug!(peers = self.entries.len(), "peer list replaced");
    }

    fn check_count(&self, peer_cnt: usize) {
        let size = self.entries.len() + 1;
        if size != peer_cnt {
            tracing::debug!(mirror = size, server = peer_cnt, "peer count mismatch, resyncing");
            self.request(SignalRequest::FetchPeerList);
        }
    }

    async fn route(&mut self, peer_id: PeerId, message: PeerMessage) {
        let Some(entry) = self.entries.remove(&peer_id) else {
            tracing::warn!(peer = %peer_id, "message from unknown peer, resyncing");
            self.request(SignalRequest::FetchPeerList);
            return;
        };

        let entry = match entry {
            MirrorEntry::Known(peer) => match self.open(&peer.id).await {
                Ok(session) => MirrorEntry::Connected(peer, session),
                Err(e) => {
                    tracing::warn!(peer = %peer.id, kind = message.init.kind(), error = %e, "cannot accept connection, dropping message");
                    self.entries.insert(peer_id, MirrorEntry::Known(peer));
                    return;
                }
            },
            connected => connected,
        };

        if let MirrorEntry::Connected(_, session) = &entry {
            session.deliver(message);
        }
        self.entries.insert(peer_id, entry);
    }

    async fn open(&self, peer_id: &PeerId) -> Result<NegotiationSession, ConnectionError> {
        let (connection, events) = self.factory.create(peer_id).await?;
        tracing::debug!(peer = %peer_id, "negotiation session started");
        Ok(NegotiationSession::start(
            peer_id.clone(),
            connection,
            events,
            self.requests.clone(),
        ))
    }

    /// Open a connection to `peer_id` now. A no-op if one already exists.
    pub async fn connect(&mut self, peer_id: &PeerId) -> Result<(), MirrorError> {
        let Some(entry) = self.entries.remove(peer_id) else {
            return Err(MirrorError::UnknownPeer(peer_id.clone()));
        };
        let entry = match entry {
            MirrorEntry::Known(peer) => match self.open(peer_id).await {
                Ok(session) => MirrorEntry::Connected(peer, session),
                Err(e) => {
                    self.entries.insert(peer_id.clone(), MirrorEntry::Known(peer));
                    return Err(e.into());
                }
            },
            connected => connected,
        };
        self.entries.insert(peer_id.clone(), entry);
        Ok(())
    }

    /// Tear down every session and forget every peer.
    pub async fn reset(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.close().await;
        }
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.entries.values().map(|e| e.peer().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        matches!(self.entries.get(peer_id), Some(MirrorEntry::Connected(..)))
    }

    pub fn session(&self, peer_id: &PeerId) -> Option<&NegotiationSession> {
        match self.entries.get(peer_id) {
            Some(MirrorEntry::Connected(_, session)) => Some(session),
            _ => None,
        }
    }

    fn request(&self, request: SignalRequest) {
        let _ = self.requests.send(request);
    }
}
