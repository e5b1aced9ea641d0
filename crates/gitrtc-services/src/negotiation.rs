//! Perfect negotiation for one remote peer.
//!
//! Both sides may start an offer at any time. When offers collide the role
//! stamped on each relayed message by the server decides the outcome: the
//! polite side drops the incoming offer and keeps its own, the impolite side
//! rolls its own offer back and answers the incoming one. Either way the pair
//! ends up stable on a single offer/answer exchange without further
//! coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use gitrtc_core::{IceCandidate, PeerId, PeerMessage, PeerMessageInit, SessionDescription, SignalRequest};

use crate::connection::{
    ConnectionError, ConnectionEvent, ConnectionEvents, LocalDescription, PeerConnection,
    SignalingState,
};

/// Negotiation state for one (local, remote) pair.
pub struct Negotiator {
    remote: PeerId,
    connection: Arc<dyn PeerConnection>,
    /// True while an offer is being created and applied locally.
    making_offer: watch::Sender<bool>,
    /// True after the last description received was a colliding offer we
    /// chose to drop. Candidates failing in that window are expected.
    ignore_offer: AtomicBool,
    outbound: mpsc::UnboundedSender<SignalRequest>,
}

/// Clears `making_offer` however the offer attempt ends, including
/// cancellation.
struct OfferInFlight<'a>(&'a watch::Sender<bool>);

impl<'a> OfferInFlight<'a> {
    fn start(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for OfferInFlight<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl Negotiator {
    pub fn new(
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        outbound: mpsc::UnboundedSender<SignalRequest>,
    ) -> Self {
        Self {
            remote,
            connection,
            making_offer: watch::channel(false).0,
            ignore_offer: AtomicBool::new(false),
            outbound,
        }
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    pub fn is_making_offer(&self) -> bool {
        *self.making_offer.borrow()
    }

    pub fn is_ignoring_offer(&self) -> bool {
        self.ignore_offer.load(Ordering::SeqCst)
    }

    /// Create an offer, apply it locally and send it to the remote side.
    pub async fn on_negotiation_needed(&self) {
        let _in_flight = OfferInFlight::start(&self.making_offer);
        if let Err(e) = self.make_offer().await {
            tracing::warn!(peer = %self.remote, error = %e, "failed to create offer");
        }
    }

    async fn make_offer(&self) -> Result<(), ConnectionError> {
        let offer = self.connection.create_offer().await?;
        self.connection
            .set_local_description(LocalDescription::Description(offer.clone()))
            .await?;
        self.send(PeerMessageInit::Description(offer));
        Ok(())
    }

    /// Forward a locally gathered candidate to the remote side.
    pub fn on_candidate_generated(&self, candidate: IceCandidate) {
        self.send(PeerMessageInit::Candidate(candidate));
    }

    /// Apply one message relayed from the remote side.
    pub async fn on_remote_message(&self, message: PeerMessage) {
        let PeerMessage { init, is_polite } = message;
        let kind = init.kind();
        match init {
            PeerMessageInit::Description(desc) => {
                if let Err(e) = self.on_description(desc, is_polite).await {
                    tracing::warn!(peer = %self.remote, kind, error = %e, "failed to apply description");
                }
            }
            PeerMessageInit::Candidate(candidate) => {
                if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                    if self.is_ignoring_offer() {
                        tracing::trace!(peer = %self.remote, error = %e, "candidate for ignored offer");
                    } else {
                        tracing::warn!(peer = %self.remote, error = %e, "failed to add candidate");
                    }
                }
            }
        }
    }

    async fn on_description(
        &self,
        desc: SessionDescription,
        polite: bool,
    ) -> Result<(), ConnectionError> {
        self.ignore_offer.store(false, Ordering::SeqCst);

        let is_offer = desc.is_offer();
        let collision = is_offer
            && (self.is_making_offer() || self.connection.signaling_state() != SignalingState::Stable);

        if collision {
            if polite {
                self.ignore_offer.store(true, Ordering::SeqCst);
                tracing::debug!(peer = %self.remote, "ignoring colliding offer");
                return Ok(());
            }

            // Let our own offer land before discarding it.
            let mut making = self.making_offer.subscribe();
            let _ = making.wait_for(|m| !*m).await;

            if self.connection.signaling_state() != SignalingState::Stable {
                tracing::debug!(peer = %self.remote, "rolling back local offer");
                self.connection
                    .set_local_description(LocalDescription::Rollback)
                    .await?;
            }
        }

        self.connection.set_remote_description(desc).await?;

        if is_offer {
            let answer = self.connection.create_answer().await?;
            self.connection
                .set_local_description(LocalDescription::Description(answer.clone()))
                .await?;
            self.send(PeerMessageInit::Description(answer));
        }
        Ok(())
    }

    fn send(&self, message: PeerMessageInit) {
        let request = SignalRequest::Offer {
            peer_id: self.remote.clone(),
            message,
        };
        if self.outbound.send(request).is_err() {
            tracing::debug!(peer = %self.remote, "signaling channel closed, dropping outbound message");
        }
    }
}

/// A live negotiation: the [`Negotiator`] plus the tasks feeding it.
///
/// Remote messages are applied strictly in arrival order on one task;
/// capability events are pumped on another. Dropping the session stops both.
/// An offer already in flight runs to completion on its own.
pub struct NegotiationSession {
    negotiator: Arc<Negotiator>,
    inbound: mpsc::UnboundedSender<PeerMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl NegotiationSession {
    pub fn start(
        remote: PeerId,
        connection: Arc<dyn PeerConnection>,
        mut events: ConnectionEvents,
        outbound: mpsc::UnboundedSender<SignalRequest>,
    ) -> Self {
        let negotiator = Arc::new(Negotiator::new(remote, connection, outbound));
        let (inbound, mut inbound_rx) = mpsc::unbounded_channel::<PeerMessage>();

        let pump = {
            let negotiator = negotiator.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ConnectionEvent::NegotiationNeeded => {
                            let n = negotiator.clone();
                            tokio::spawn(async move { n.on_negotiation_needed().await });
                        }
                        ConnectionEvent::CandidateGenerated(c) => {
                            negotiator.on_candidate_generated(c)
                        }
                        ConnectionEvent::ConnectionStateChanged(state) => {
                            tracing::debug!(peer = %negotiator.remote(), %state, "connection state");
                        }
                    }
                }
            })
        };

        let apply = {
            let negotiator = negotiator.clone();
            tokio::spawn(async move {
                while let Some(message) = inbound_rx.recv().await {
                    negotiator.on_remote_message(message).await;
                }
            })
        };

        Self {
            negotiator,
            inbound,
            tasks: vec![pump, apply],
        }
    }

    /// Queue a remote message behind any still being applied.
    pub fn deliver(&self, message: PeerMessage) {
        let _ = self.inbound.send(message);
    }

    pub fn negotiator(&self) -> &Arc<Negotiator> {
        &self.negotiator
    }

    /// Stop the tasks and close the connection.
    pub async fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.negotiator.connection().close().await;
    }
}

impl Drop for NegotiationSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
