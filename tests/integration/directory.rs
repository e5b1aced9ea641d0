//! Directory membership over real sockets: join/leave announcements, counts,
//! handshake gating.

use crate::*;

#[tokio::test]
async fn three_peers_join_and_one_leaves() -> Result<()> {
    let relay = Relay::start().await?;

    let (mut a, snapshot) = Client::join(&relay, "A").await?;
    assert!(snapshot.is_empty());
    let id_a = relay.id_of("A").await?;

    let (mut b, snapshot) = Client::join(&relay, "B").await?;
    assert_eq!(snapshot, vec![Peer::new(id_a.clone(), "A")]);
    let id_b = relay.id_of("B").await?;
    assert_eq!(
        a.recv().await?,
        SignalEvent::NewPeer {
            peer: Peer::new(id_b.clone(), "B"),
            peer_cnt: 2
        }
    );

    let (mut c, snapshot) = Client::join(&relay, "C").await?;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains(&Peer::new(id_a.clone(), "A")));
    assert!(snapshot.contains(&Peer::new(id_b.clone(), "B")));
    let id_c = relay.id_of("C").await?;
    let announce_c = SignalEvent::NewPeer {
        peer: Peer::new(id_c, "C"),
        peer_cnt: 3,
    };
    assert_eq!(a.recv().await?, announce_c);
    assert_eq!(b.recv().await?, announce_c);

    b.close().await?;
    let gone = SignalEvent::DeletePeer {
        peer_id: id_b,
        peer_cnt: 2,
    };
    assert_eq!(a.recv().await?, gone);
    assert_eq!(c.recv().await?, gone);
    a.expect_silence().await?;
    c.expect_silence().await?;
    Ok(())
}

#[tokio::test]
async fn abrupt_disconnect_is_announced_once() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;
    let (b, _) = Client::join(&relay, "B").await?;
    let id_b = relay.id_of("B").await?;
    a.recv().await?;

    // No close frame, just a dropped TCP connection.
    drop(b);

    assert_eq!(
        a.recv().await?,
        SignalEvent::DeletePeer {
            peer_id: id_b,
            peer_cnt: 1
        }
    );
    a.expect_silence().await?;
    assert_eq!(relay.directory.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn requests_before_handshake_are_ignored() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut watcher, _) = Client::join(&relay, "W").await?;

    let mut early = Client::connect(&relay).await?;
    early.send(&SignalRequest::FetchPeerList).await?;
    early
        .send_raw(r#"{"action":"offer","peer_id":"x","message":{"candidate":{}}}"#)
        .await?;
    early.expect_silence().await?;
    watcher.expect_silence().await?;
    assert_eq!(relay.directory.len().await, 1);

    // The connection is still usable; a handshake admits it.
    early
        .send(&SignalRequest::Handshake {
            name: "late".into(),
        })
        .await?;
    match early.recv().await? {
        SignalEvent::FullPeerList { peers } => assert_eq!(peers.len(), 1),
        other => bail!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        watcher.recv().await?,
        SignalEvent::NewPeer { peer_cnt: 2, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_frames_do_not_drop_the_connection() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;

    a.send_raw("not json").await?;
    a.send_raw(r#"{"action":"dance"}"#).await?;
    a.send_raw(r#"{"action":"handshake","name":"again"}"#).await?;
    a.expect_silence().await?;

    a.send(&SignalRequest::FetchPeerList).await?;
    assert_eq!(a.recv().await?, SignalEvent::FullPeerList { peers: vec![] });
    assert_eq!(relay.directory.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn legacy_socket_path_is_served() -> Result<()> {
    let relay = Relay::start().await?;
    let url = format!("ws://{}/git-rtc-ws", relay.addr);
    let (mut socket, _) = connect_async(url).await?;
    socket
        .send(Message::Text(
            SignalRequest::Handshake { name: "ui".into() }.encode()?.into(),
        ))
        .await?;
    let frame = tokio::time::timeout(EVENT_TIMEOUT, socket.next())
        .await?
        .context("socket closed")??;
    assert!(frame.to_text()?.contains("full-peer-list"));
    Ok(())
}
