//! Persistent client role: join a signaling server and keep a directory
//! mirror in sync with it.
//!
//! Each connection gets a fresh mirror; the server assigns a new id per
//! connection, so nothing negotiated under the old id survives a reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use gitrtc_core::config::ClientConfig;
use gitrtc_core::{SignalEvent, SignalRequest};
use gitrtc_services::{ConnectionFactory, DirectoryMirror};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub name: String,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
}

impl ClientOptions {
    pub fn from_config(url: String, config: &ClientConfig) -> Self {
        Self {
            url,
            name: config.display_name(),
            reconnect_min: Duration::from_millis(config.reconnect_min_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms.max(config.reconnect_min_ms)),
        }
    }
}

/// Capped exponential reconnect delay.
#[derive(Debug)]
struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, next: min }
    }

    fn reset(&mut self) {
        self.next = self.min;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }
}

/// Run until `shutdown` fires.
pub async fn run(
    opts: ClientOptions,
    factory: Arc<dyn ConnectionFactory>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = supervise(&opts, factory) => {}
        _ = shutdown.recv() => tracing::info!(url = %opts.url, "client stopping"),
    }
}

async fn supervise(opts: &ClientOptions, factory: Arc<dyn ConnectionFactory>) {
    let mut backoff = Backoff::new(opts.reconnect_min, opts.reconnect_max);
    loop {
        match connect_async(opts.url.as_str()).await {
            Ok((stream, _)) => {
                backoff.reset();
                tracing::info!(url = %opts.url, "joined signaling server");
                match drive(stream, opts, factory.clone()).await {
                    Ok(()) => tracing::info!(url = %opts.url, "signaling server closed the connection"),
                    Err(e) => tracing::warn!(url = %opts.url, error = %e, "signaling connection failed"),
                }
            }
            Err(e) => tracing::warn!(url = %opts.url, error = %e, "cannot reach signaling server"),
        }

        let delay = backoff.next_delay();
        tracing::debug!(url = %opts.url, retry_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn drive<S>(
    stream: S,
    opts: &ClientOptions,
    factory: Arc<dyn ConnectionFactory>,
) -> anyhow::Result<()>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();
    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<SignalRequest>();
    let mut mirror = DirectoryMirror::new(req_tx, factory);

    let result: anyhow::Result<()> = async {
        let handshake = SignalRequest::Handshake {
            name: opts.name.clone(),
        };
        write.send(Message::Text(handshake.encode()?.into())).await?;

        loop {
            tokio::select! {
                Some(request) = req_rx.recv() => {
                    tracing::debug!(action = request.action(), "sending");
                    write.send(Message::Text(request.encode()?.into())).await?;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match SignalEvent::decode(text.as_str()) {
                        Ok(event) => {
                            tracing::debug!(action = event.action(), "received");
                            mirror.apply(event).await;
                        }
                        Err(e) => tracing::warn!(error = %e, "malformed event from server"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
    .await;

    mirror.reset().await;
    result
}
