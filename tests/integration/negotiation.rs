//! Two client mirrors negotiating through a live relay with mock
//! connections, including simultaneous offers.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use gitrtc_services::mock::MockFactory;
use gitrtc_services::{ConnectionEvent, DirectoryMirror, MirrorError, PeerConnection, SignalingState};

use crate::*;

type ConnectReply = oneshot::Sender<Result<(), MirrorError>>;

/// A mirror driven over a real socket, accepting connect commands.
struct MirrorClient {
    factory: Arc<MockFactory>,
    commands: mpsc::UnboundedSender<(PeerId, ConnectReply)>,
    task: JoinHandle<()>,
}

impl MirrorClient {
    async fn start(relay: &Relay, name: &str) -> Result<Self> {
        let (socket, _) = connect_async(relay.ws_url()).await?;
        let factory = Arc::new(MockFactory::new());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(socket, name.to_string(), factory.clone(), command_rx));
        Ok(Self {
            factory,
            commands,
            task,
        })
    }

    /// Retry until the mirror has learned about `peer` and opened a session.
    async fn connect(&self, peer: &PeerId) -> Result<()> {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let (tx, rx) = oneshot::channel();
            self.commands.send((peer.clone(), tx))?;
            match rx.await? {
                Ok(()) => return Ok(()),
                Err(MirrorError::UnknownPeer(_)) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for MirrorClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive(
    mut socket: Socket,
    name: String,
    factory: Arc<MockFactory>,
    mut commands: mpsc::UnboundedReceiver<(PeerId, ConnectReply)>,
) {
    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<SignalRequest>();
    let mut mirror = DirectoryMirror::new(req_tx.clone(), factory);
    let _ = req_tx.send(SignalRequest::Handshake { name });

    loop {
        tokio::select! {
            Some(request) = req_rx.recv() => {
                let Ok(text) = request.encode() else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Some((peer, reply)) = commands.recv() => {
                let _ = reply.send(mirror.connect(&peer).await);
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(event) = SignalEvent::decode(text.as_str()) {
                        mirror.apply(event).await;
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    mirror.reset().await;
}

async fn converged(a: &MirrorClient, id_b: &PeerId, b: &MirrorClient, id_a: &PeerId) -> bool {
    let (Some(ca), Some(cb)) = (a.factory.connection(id_b), b.factory.connection(id_a)) else {
        return false;
    };
    ca.signaling_state() == SignalingState::Stable
        && cb.signaling_state() == SignalingState::Stable
        && ca.local_description().is_some()
        && ca.local_description() == cb.remote_description()
        && ca.remote_description() == cb.local_description()
}

#[tokio::test]
async fn one_sided_offer_completes() -> Result<()> {
    let relay = Relay::start().await?;
    let a = MirrorClient::start(&relay, "A").await?;
    let b = MirrorClient::start(&relay, "B").await?;
    let directory = &relay.directory;
    eventually("both registered", || async move { directory.len().await == 2 }).await?;
    let id_a = relay.id_of("A").await?;
    let id_b = relay.id_of("B").await?;

    a.connect(&id_b).await?;
    let conn = a.factory.connection(&id_b).context("connection for B")?;
    conn.emit(ConnectionEvent::NegotiationNeeded);

    let (ra, rb, ida, idb) = (&a, &b, &id_a, &id_b);
    eventually("offer/answer exchange", || converged(ra, idb, rb, ida)).await?;
    assert_eq!(b.factory.created(), 1);
    Ok(())
}

#[tokio::test]
async fn simultaneous_offers_converge() -> Result<()> {
    let relay = Relay::start().await?;
    let a = MirrorClient::start(&relay, "A").await?;
    let b = MirrorClient::start(&relay, "B").await?;
    let directory = &relay.directory;
    eventually("both registered", || async move { directory.len().await == 2 }).await?;
    let id_a = relay.id_of("A").await?;
    let id_b = relay.id_of("B").await?;

    a.connect(&id_b).await?;
    b.connect(&id_a).await?;
    let conn_a = a.factory.connection(&id_b).context("A's connection")?;
    let conn_b = b.factory.connection(&id_a).context("B's connection")?;

    conn_a.emit(ConnectionEvent::NegotiationNeeded);
    conn_b.emit(ConnectionEvent::NegotiationNeeded);

    let (ra, rb, ida, idb) = (&a, &b, &id_a, &id_b);
    eventually("glare to resolve", || converged(ra, idb, rb, ida)).await?;

    // The impolite side is the one that rolled back.
    let (impolite, polite) = if id_a < id_b {
        (&conn_a, &conn_b)
    } else {
        (&conn_b, &conn_a)
    };
    assert_eq!(polite.rollbacks(), 0);
    assert!(impolite.rollbacks() <= 1);
    Ok(())
}

#[tokio::test]
async fn departure_closes_the_session() -> Result<()> {
    let relay = Relay::start().await?;
    let a = MirrorClient::start(&relay, "A").await?;
    let b = MirrorClient::start(&relay, "B").await?;
    let directory = &relay.directory;
    eventually("both registered", || async move { directory.len().await == 2 }).await?;
    let id_b = relay.id_of("B").await?;

    a.connect(&id_b).await?;
    let conn = a.factory.connection(&id_b).context("connection for B")?;

    drop(b);
    eventually("session teardown", || {
        let conn = conn.clone();
        async move { conn.is_closed() }
    })
    .await?;
    Ok(())
}
