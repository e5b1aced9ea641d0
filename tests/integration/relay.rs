//! Offer relay: role stamping, stale references, self-addressed messages.

use crate::*;
use gitrtc_core::{IceCandidate, PeerMessage, PeerMessageInit, SessionDescription};
use serde_json::json;

#[tokio::test]
async fn relay_delivers_with_recipient_role() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;
    let (mut b, _) = Client::join(&relay, "B").await?;
    a.recv().await?;
    let id_a = relay.id_of("A").await?;
    let id_b = relay.id_of("B").await?;

    let offer = PeerMessageInit::Description(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"));
    a.send(&SignalRequest::Offer {
        peer_id: id_b.clone(),
        message: offer.clone(),
    })
    .await?;
    assert_eq!(
        b.recv().await?,
        SignalEvent::ReceiveOffer {
            peer_id: id_a.clone(),
            message: PeerMessage {
                init: offer,
                is_polite: id_b > id_a,
            },
        }
    );

    let candidate = PeerMessageInit::Candidate(IceCandidate(json!({
        "candidate": "candidate:1 1 udp 2122260223 192.0.2.1 54321 typ host",
        "sdpMid": "0",
        "sdpMLineIndex": 0
    })));
    b.send(&SignalRequest::Offer {
        peer_id: id_a.clone(),
        message: candidate.clone(),
    })
    .await?;
    assert_eq!(
        a.recv().await?,
        SignalEvent::ReceiveOffer {
            peer_id: id_b.clone(),
            message: PeerMessage {
                init: candidate,
                is_polite: id_a > id_b,
            },
        }
    );

    a.expect_silence().await?;
    b.expect_silence().await?;
    Ok(())
}

#[tokio::test]
async fn offer_to_departed_peer_resyncs_sender() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;
    let (b, _) = Client::join(&relay, "B").await?;
    let (mut c, _) = Client::join(&relay, "C").await?;
    let id_b = relay.id_of("B").await?;
    let id_c = relay.id_of("C").await?;
    a.recv().await?;
    a.recv().await?;

    b.close().await?;
    a.recv().await?;
    c.recv().await?;

    a.send(&SignalRequest::Offer {
        peer_id: id_b,
        message: PeerMessageInit::Candidate(IceCandidate(json!({}))),
    })
    .await?;
    assert_eq!(
        a.recv().await?,
        SignalEvent::FullPeerList {
            peers: vec![Peer::new(id_c, "C")]
        }
    );
    c.expect_silence().await?;
    Ok(())
}

#[tokio::test]
async fn offer_to_self_is_dropped() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;
    let id_a = relay.id_of("A").await?;

    a.send(&SignalRequest::Offer {
        peer_id: id_a,
        message: PeerMessageInit::Candidate(IceCandidate(json!({}))),
    })
    .await?;
    a.expect_silence().await?;

    a.send(&SignalRequest::FetchPeerList).await?;
    assert_eq!(a.recv().await?, SignalEvent::FullPeerList { peers: vec![] });
    Ok(())
}

#[tokio::test]
async fn payload_with_both_fields_is_rejected() -> Result<()> {
    let relay = Relay::start().await?;
    let (mut a, _) = Client::join(&relay, "A").await?;
    let (mut b, _) = Client::join(&relay, "B").await?;
    a.recv().await?;
    let id_b = relay.id_of("B").await?;

    let text = json!({
        "action": "offer",
        "peer_id": id_b,
        "message": { "candidate": {}, "description": { "type": "offer", "sdp": "v=0" } }
    })
    .to_string();
    a.send_raw(&text).await?;
    b.expect_silence().await?;
    a.expect_silence().await?;
    Ok(())
}
