//! JSON status API served next to the signaling socket.

use serde_json::Value;

use crate::*;

#[tokio::test]
async fn status_reports_peer_count() -> Result<()> {
    let relay = Relay::start().await?;
    let (_a, _) = Client::join(&relay, "A").await?;
    let (_b, _) = Client::join(&relay, "B").await?;

    let status: Value = reqwest::get(relay.http_url("/api/status"))
        .await?
        .json()
        .await?;
    assert_eq!(status["peers"], 2);
    assert!(status["version"].is_string());
    assert!(status["uptime_secs"].is_u64());
    Ok(())
}

#[tokio::test]
async fn peers_lists_handshake_names() -> Result<()> {
    let relay = Relay::start().await?;
    let (_a, _) = Client::join(&relay, "laptop").await?;
    let id = relay.id_of("laptop").await?;

    let resp: Value = reqwest::get(relay.http_url("/api/peers"))
        .await?
        .json()
        .await?;
    let peers = resp["peers"].as_array().context("peers array")?;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["id"], id.as_str());
    assert_eq!(peers[0]["name"], "laptop");
    Ok(())
}

#[tokio::test]
async fn departed_peers_disappear_from_listing() -> Result<()> {
    let relay = Relay::start().await?;
    let (a, _) = Client::join(&relay, "A").await?;
    a.close().await?;
    let directory = &relay.directory;
    eventually("deregistration", || async move { directory.is_empty().await }).await?;

    let resp: Value = reqwest::get(relay.http_url("/api/peers"))
        .await?
        .json()
        .await?;
    assert_eq!(resp["peers"].as_array().map(Vec::len), Some(0));
    Ok(())
}
