//! gitrtcd — git-rtc signaling daemon.
//!
//! Serves the signaling relay and, for every configured signal server, runs
//! a persistent client that mirrors that server's peer directory.

use std::future;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;

use gitrtc_api::ApiState;
use gitrtc_core::config::GitRtcConfig;
use gitrtc_services::PeerDirectory;

mod client;
mod rtc;

use client::ClientOptions;

#[derive(Debug, Default, PartialEq)]
struct Args {
    join: Vec<String>,
    name: Option<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--join" => parsed.join.push(args.next().context("--join needs a URL")?),
                "--name" => parsed.name = Some(args.next().context("--name needs a value")?),
                other => bail!("unknown argument: {other}\nusage: gitrtcd [--join <ws-url>]... [--name <name>]"),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    // Load config
    if let Err(e) = GitRtcConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = GitRtcConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GitRtcConfig::default()
    });
    if let Some(name) = args.name {
        config.client.name = name;
    }
    config.client.signal_servers.extend(args.join);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gitrtcd starting");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // ── Signaling server ─────────────────────────────────────────────────────

    let server_task = if config.server.enabled {
        let state = ApiState::new(PeerDirectory::new());
        let bind = config.server.bind.clone();
        let port = config.server.port;
        Some(tokio::spawn(async move {
            if let Err(e) = gitrtc_api::serve(state, &bind, port).await {
                tracing::error!(error = %e, "signaling server failed");
            }
        }))
    } else {
        None
    };

    // ── Clients ──────────────────────────────────────────────────────────────

    let factory = rtc::factory(&config.rtc);
    let clients: Vec<_> = config
        .client
        .signal_servers
        .iter()
        .map(|url| {
            let opts = ClientOptions::from_config(url.clone(), &config.client);
            tracing::info!(url = %opts.url, name = %opts.name, "joining signal server");
            tokio::spawn(client::run(opts, factory.clone(), shutdown_tx.subscribe()))
        })
        .collect();

    if server_task.is_none() && clients.is_empty() {
        bail!("server disabled and no signal servers to join");
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let server_exit = async {
        match server_task {
            Some(task) => task.await,
            None => future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
        r = server_exit              => tracing::error!("signaling server exited: {:?}", r),
    }

    let _ = shutdown_tx.send(());
    for task in clients {
        let _ = task.await;
    }
    Ok(())
}
