//! Relay status and peer listing.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    peers: usize,
    uptime_secs: u64,
    version: String,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    id: String,
    name: String,
    origins: Vec<String>,
    connected_secs: u64,
}

// ── Formatting ────────────────────────────────────────────────────────────────

/// `93784` → `1d 2h 3m 4s`; leading zero units are omitted.
fn format_duration(secs: u64) -> String {
    let (d, h, m, s) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    let mut out = String::new();
    for (value, unit) in [(d, "d"), (h, "h"), (m, "m")] {
        if value > 0 || !out.is_empty() {
            out.push_str(&format!("{value}{unit} "));
        }
    }
    out.push_str(&format!("{s}s"));
    out
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  git-rtc Signaling Relay");
    println!("═══════════════════════════════════════");
    println!("  Version : {}", resp.version);
    println!("  Uptime  : {}", format_duration(resp.uptime_secs));
    println!("  Peers   : {}", resp.peers);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers connected.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Connected Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let origins = if p.origins.is_empty() {
            "-".to_string()
        } else {
            p.origins.join(", ")
        };
        println!("  ┌─ {}", short_id(&p.id));
        println!("  │  name      : {}", p.name);
        println!("  │  origin    : {}", origins);
        println!("  └─ connected : {}", format_duration(p.connected_secs));
    }

    Ok(())
}
