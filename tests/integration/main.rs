//! git-rtc integration test harness.
//!
//! Every test starts its own relay on 127.0.0.1:0 and talks to it over real
//! WebSockets, exactly as browser and daemon clients do.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use gitrtc_api::ApiState;
use gitrtc_core::{Peer, PeerId, SignalEvent, SignalRequest};
use gitrtc_services::PeerDirectory;

mod directory;
mod negotiation;
mod relay;
mod status;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long to wait for an event that should arrive.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to listen before concluding nothing is coming.
pub const QUIET: Duration = Duration::from_millis(150);

/// An in-process relay. Stops when dropped.
pub struct Relay {
    pub addr: SocketAddr,
    pub directory: PeerDirectory,
    task: JoinHandle<()>,
}

impl Relay {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let directory = PeerDirectory::new();
        let state = ApiState::new(directory.clone());
        let task = tokio::spawn(async move {
            let _ = gitrtc_api::serve_on(listener, state).await;
        });
        Ok(Self {
            addr,
            directory,
            task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Id the relay assigned to the peer that handshook as `name`.
    pub async fn id_of(&self, name: &str) -> Result<PeerId> {
        self.directory
            .entries()
            .await
            .into_iter()
            .find(|e| e.peer.name == name)
            .map(|e| e.peer.id)
            .with_context(|| format!("no peer named {name}"))
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A raw signaling client speaking JSON frames.
pub struct Client {
    socket: Socket,
}

impl Client {
    pub async fn connect(relay: &Relay) -> Result<Self> {
        let (socket, _) = connect_async(relay.ws_url()).await?;
        Ok(Self { socket })
    }

    /// Connect, handshake, and consume the initial `full-peer-list`.
    pub async fn join(relay: &Relay, name: &str) -> Result<(Self, Vec<Peer>)> {
        let mut client = Self::connect(relay).await?;
        client
            .send(&SignalRequest::Handshake {
                name: name.to_string(),
            })
            .await?;
        match client.recv().await? {
            SignalEvent::FullPeerList { peers } => Ok((client, peers)),
            other => bail!("expected full-peer-list, got {other:?}"),
        }
    }

    pub async fn send(&mut self, request: &SignalRequest) -> Result<()> {
        self.send_raw(&request.encode()?).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.socket.send(Message::Text(text.to_string().into())).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<SignalEvent> {
        loop {
            let frame = tokio::time::timeout(EVENT_TIMEOUT, self.socket.next())
                .await
                .context("timed out waiting for an event")?
                .context("socket closed")??;
            if let Message::Text(text) = frame {
                return Ok(SignalEvent::decode(text.as_str())?);
            }
        }
    }

    /// Fails if any event arrives within [`QUIET`].
    pub async fn expect_silence(&mut self) -> Result<()> {
        match tokio::time::timeout(QUIET, self.socket.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => bail!("unexpected event: {text}"),
            Ok(other) => bail!("unexpected frame: {other:?}"),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

/// Poll `check` until it holds or `EVENT_TIMEOUT` passes.
pub async fn eventually<F, Fut>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for {what}")
}
