//! In-memory connection capability.
//!
//! Models the signaling-state machine of a WebRTC peer connection closely
//! enough to exercise negotiation: descriptions are checked against the
//! current state, rollback restores the last stable descriptions and
//! candidates are refused until a remote description exists. No media, no
//! ICE. Used by the unit tests here and by the integration suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use gitrtc_core::{IceCandidate, PeerId, SdpType, SessionDescription};

use crate::connection::{
    ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, LocalDescription,
    PeerConnection, SignalingState,
};

/// Holds one `create_offer` call open until released.
#[derive(Default)]
pub struct OfferGate {
    /// Notified once the held call has started.
    pub entered: Notify,
    /// Notify to let the held call finish.
    pub release: Notify,
}

#[derive(Default)]
struct Descriptions {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
}

struct State {
    signaling: SignalingState,
    current: Descriptions,
    stable: Descriptions,
    candidates: Vec<IceCandidate>,
    rollbacks: usize,
    gate: Option<Arc<OfferGate>>,
}

pub struct MockConnection {
    label: String,
    serial: AtomicU32,
    state: Mutex<State>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl MockConnection {
    pub fn new(label: impl Into<String>) -> (Arc<Self>, ConnectionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            label: label.into(),
            serial: AtomicU32::new(0),
            state: Mutex::new(State {
                signaling: SignalingState::Stable,
                current: Descriptions::default(),
                stable: Descriptions::default(),
                candidates: Vec::new(),
                rollbacks: 0,
                gate: None,
            }),
            events,
        });
        (conn, rx)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sdp(&self, kind: &str) -> String {
        let n = self.serial.fetch_add(1, Ordering::Relaxed);
        format!("{kind}:{}:{n}", self.label)
    }

    /// Raise a capability event, as a real backend would.
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    /// Make the next `create_offer` wait on the returned gate.
    pub fn hold_next_offer(&self) -> Arc<OfferGate> {
        let gate = Arc::new(OfferGate::default());
        self.lock().gate = Some(gate.clone());
        gate
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.lock().current.local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.lock().current.remote.clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.lock().candidates.clone()
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn is_closed(&self) -> bool {
        self.lock().signaling == SignalingState::Closed
    }
}

fn rollback(state: &mut State) -> Result<(), ConnectionError> {
    match state.signaling {
        SignalingState::HaveLocalOffer
        | SignalingState::HaveRemoteOffer
        | SignalingState::HaveLocalPranswer
        | SignalingState::HaveRemotePranswer => {
            state.current = Descriptions {
                local: state.stable.local.clone(),
                remote: state.stable.remote.clone(),
            };
            state.signaling = SignalingState::Stable;
            state.rollbacks += 1;
            Ok(())
        }
        other => Err(ConnectionError::InvalidState(other)),
    }
}

fn settle(state: &mut State) {
    state.signaling = SignalingState::Stable;
    state.stable = Descriptions {
        local: state.current.local.clone(),
        remote: state.current.remote.clone(),
    };
}

#[async_trait]
impl PeerConnection for MockConnection {
    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError> {
        let gate = {
            let mut state = self.lock();
            if state.signaling == SignalingState::Closed {
                return Err(ConnectionError::Closed);
            }
            state.gate.take()
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(SessionDescription::offer(self.sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError> {
        match self.lock().signaling {
            SignalingState::HaveRemoteOffer => Ok(SessionDescription::answer(self.sdp("answer"))),
            SignalingState::Closed => Err(ConnectionError::Closed),
            other => Err(ConnectionError::InvalidState(other)),
        }
    }

    async fn set_local_description(&self, desc: LocalDescription) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        if state.signaling == SignalingState::Closed {
            return Err(ConnectionError::Closed);
        }
        let desc = match desc {
            LocalDescription::Rollback => return rollback(&mut state),
            LocalDescription::Description(d) if d.sdp_type == SdpType::Rollback => {
                return rollback(&mut state)
            }
            LocalDescription::Description(d) => d,
        };

        match (desc.sdp_type, state.signaling) {
            (SdpType::Offer, SignalingState::Stable | SignalingState::HaveLocalOffer) => {
                state.current.local = Some(desc);
                state.signaling = SignalingState::HaveLocalOffer;
            }
            (SdpType::Answer, SignalingState::HaveRemoteOffer | SignalingState::HaveLocalPranswer) => {
                state.current.local = Some(desc);
                settle(&mut state);
            }
            (SdpType::Pranswer, SignalingState::HaveRemoteOffer | SignalingState::HaveLocalPranswer) => {
                state.current.local = Some(desc);
                state.signaling = SignalingState::HaveLocalPranswer;
            }
            (_, other) => return Err(ConnectionError::InvalidState(other)),
        }
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        match (desc.sdp_type, state.signaling) {
            (_, SignalingState::Closed) => return Err(ConnectionError::Closed),
            (SdpType::Rollback, _) => return rollback(&mut state),
            (SdpType::Offer, SignalingState::Stable | SignalingState::HaveRemoteOffer) => {
                state.current.remote = Some(desc);
                state.signaling = SignalingState::HaveRemoteOffer;
            }
            (SdpType::Answer, SignalingState::HaveLocalOffer | SignalingState::HaveRemotePranswer) => {
                state.current.remote = Some(desc);
                settle(&mut state);
            }
            (SdpType::Pranswer, SignalingState::HaveLocalOffer | SignalingState::HaveRemotePranswer) => {
                state.current.remote = Some(desc);
                state.signaling = SignalingState::HaveRemotePranswer;
            }
            (_, other) => return Err(ConnectionError::InvalidState(other)),
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        if state.signaling == SignalingState::Closed {
            return Err(ConnectionError::Closed);
        }
        if state.current.remote.is_none() {
            return Err(ConnectionError::InvalidState(state.signaling));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.lock().signaling
    }

    async fn close(&self) {
        self.lock().signaling = SignalingState::Closed;
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Hands out [`MockConnection`]s and remembers them by remote peer.
#[derive(Default)]
pub struct MockFactory {
    created: Mutex<HashMap<PeerId, Arc<MockConnection>>>,
    count: AtomicU32,
    refuse: bool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every `create` fails with [`ConnectionError::Unsupported`].
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Most recent connection created for `remote`.
    pub fn connection(&self, remote: &PeerId) -> Option<Arc<MockConnection>> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(remote)
            .cloned()
    }

    /// Total connections created so far.
    pub fn created(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(
        &self,
        remote: &PeerId,
    ) -> Result<(Arc<dyn PeerConnection>, ConnectionEvents), ConnectionError> {
        if self.refuse {
            return Err(ConnectionError::Unsupported);
        }
        let (conn, events) = MockConnection::new(remote.as_str());
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(remote.clone(), conn.clone());
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok((conn, events))
    }
}
