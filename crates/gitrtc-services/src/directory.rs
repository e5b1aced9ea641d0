//! Peer directory — the signaling server's table of registered sessions.
//!
//! Every mutation and the broadcast that announces it happen under the same
//! write lock, so each session observes `new-peer` / `delete-peer` events in
//! one global order and every `peer_cnt` equals the directory size at that
//! point in the order. Events are enqueued on per-session unbounded channels;
//! a slow socket never blocks the lock holder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use gitrtc_core::{Peer, PeerId, PeerMessage, PeerMessageInit, SignalEvent};

/// Outbound queue of one signaling session.
pub type EventSender = mpsc::UnboundedSender<SignalEvent>;

struct Registration {
    peer: Peer,
    sender: EventSender,
    origins: Vec<String>,
    connected_at: Instant,
}

/// Read-only view of a registered peer, for status endpoints.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub peer: Peer,
    /// Origins the session's socket was opened from, if the client sent any.
    pub origins: Vec<String>,
    pub connected_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("peer {0} cannot signal itself")]
    SelfRelay(PeerId),
}

/// Shared directory handle. Clones refer to the same table.
#[derive(Clone, Default)]
pub struct PeerDirectory {
    clients: Arc<RwLock<HashMap<PeerId, Registration>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a session under a freshly allocated id.
    ///
    /// The new session receives `full-peer-list` of everyone else; everyone
    /// else receives `new-peer`. Returns the new peer and the snapshot it was
    /// sent.
    pub async fn register(
        &self,
        name: String,
        sender: EventSender,
        origins: Vec<String>,
    ) -> (Peer, Vec<Peer>) {
        let mut clients = self.clients.write().await;

        let id = loop {
            let id = PeerId::generate();
            if !clients.contains_key(&id) {
                break id;
            }
        };
        let peer = Peer::new(id, name);
        let others: Vec<Peer> = clients.values().map(|r| r.peer.clone()).collect();

        let _ = sender.send(SignalEvent::FullPeerList {
            peers: others.clone(),
        });
        clients.insert(
            peer.id.clone(),
            Registration {
                peer: peer.clone(),
                sender,
                origins,
                connected_at: Instant::now(),
            },
        );

        let peer_cnt = clients.len();
        broadcast(
            &clients,
            &peer.id,
            SignalEvent::NewPeer {
                peer: peer.clone(),
                peer_cnt,
            },
        );

        tracing::info!(peer = %peer.id, name = %peer.name, peer_cnt, "peer joined");
        (peer, others)
    }

    /// Remove a session. Returns false if it was not registered; no event is
    /// sent in that case.
    pub async fn deregister(&self, id: &PeerId) -> bool {
        let mut clients = self.clients.write().await;
        let Some(gone) = clients.remove(id) else {
            return false;
        };

        let peer_cnt = clients.len();
        broadcast(
            &clients,
            id,
            SignalEvent::DeletePeer {
                peer_id: id.clone(),
                peer_cnt,
            },
        );

        tracing::info!(
            peer = %id,
            name = %gone.peer.name,
            peer_cnt,
            connected_secs = gone.connected_at.elapsed().as_secs(),
            "peer left"
        );
        true
    }

    /// Every registered peer.
    pub async fn snapshot(&self) -> Vec<Peer> {
        let clients = self.clients.read().await;
        clients.values().map(|r| r.peer.clone()).collect()
    }

    /// Every registered peer except `id`.
    pub async fn snapshot_for(&self, id: &PeerId) -> Vec<Peer> {
        let clients = self.clients.read().await;
        others_of(&clients, id)
    }

    /// Enqueue `full-peer-list` for `id`. Returns false if `id` is not
    /// registered.
    ///
    /// The snapshot is enqueued while membership is frozen, so it can never
    /// overtake a `new-peer` / `delete-peer` it does not reflect.
    pub async fn send_snapshot(&self, id: &PeerId) -> bool {
        let clients = self.clients.read().await;
        match clients.get(id) {
            Some(reg) => {
                let _ = reg.sender.send(SignalEvent::FullPeerList {
                    peers: others_of(&clients, id),
                });
                true
            }
            None => false,
        }
    }

    /// Forward `message` from `from` to `to`, stamped with the recipient's
    /// role in the pair.
    ///
    /// When `to` is unknown the sender's view is stale: it gets a fresh
    /// `full-peer-list` and the message is dropped.
    pub async fn relay(
        &self,
        from: &PeerId,
        to: &PeerId,
        message: PeerMessageInit,
    ) -> Result<(), DirectoryError> {
        if from == to {
            return Err(DirectoryError::SelfRelay(from.clone()));
        }

        let clients = self.clients.read().await;
        let Some(dest) = clients.get(to) else {
            if let Some(src) = clients.get(from) {
                let _ = src.sender.send(SignalEvent::FullPeerList {
                    peers: others_of(&clients, from),
                });
            }
            return Err(DirectoryError::UnknownPeer(to.clone()));
        };

        let kind = message.kind();
        let is_polite = to.is_polite_towards(from);
        let _ = dest.sender.send(SignalEvent::ReceiveOffer {
            peer_id: from.clone(),
            message: PeerMessage {
                init: message,
                is_polite,
            },
        });
        tracing::debug!(from = %from, to = %to, kind, is_polite, "relayed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn contains(&self, id: &PeerId) -> bool {
        self.clients.read().await.contains_key(id)
    }

    /// Status view of every registration, oldest first.
    pub async fn entries(&self) -> Vec<DirectoryEntry> {
        let clients = self.clients.read().await;
        let mut entries: Vec<DirectoryEntry> = clients
            .values()
            .map(|r| DirectoryEntry {
                peer: r.peer.clone(),
                origins: r.origins.clone(),
                connected_at: r.connected_at,
            })
            .collect();
        entries.sort_by_key(|e| e.connected_at);
        entries
    }
}

fn others_of(clients: &HashMap<PeerId, Registration>, id: &PeerId) -> Vec<Peer> {
    clients
        .iter()
        .filter(|(k, _)| *k != id)
        .map(|(_, r)| r.peer.clone())
        .collect()
}

/// Send `event` to every session except `skip`. Closed queues are ignored;
/// their owners deregister on their own.
fn broadcast(clients: &HashMap<PeerId, Registration>, skip: &PeerId, event: SignalEvent) {
    for (id, reg) in clients {
        if id != skip {
            let _ = reg.sender.send(event.clone());
        }
    }
}
