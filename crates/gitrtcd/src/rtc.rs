//! Connection factories for the client role.
//!
//! Built with the `webrtc` feature, connections are real `RTCPeerConnection`s
//! that open a `git-rtc` data channel. Without it the client only observes
//! the directory: every attempt to negotiate is declined.

use std::sync::Arc;

use gitrtc_core::config::RtcConfig;
use gitrtc_services::ConnectionFactory;

#[cfg(not(feature = "webrtc"))]
pub fn factory(_config: &RtcConfig) -> Arc<dyn ConnectionFactory> {
    Arc::new(observer::ObserverFactory)
}

#[cfg(feature = "webrtc")]
pub fn factory(config: &RtcConfig) -> Arc<dyn ConnectionFactory> {
    Arc::new(backend::WebRtcFactory::new(config.stun_servers.clone()))
}

#[cfg(not(feature = "webrtc"))]
mod observer {
    use std::sync::Arc;

    use async_trait::async_trait;

    use gitrtc_core::PeerId;
    use gitrtc_services::{ConnectionError, ConnectionEvents, ConnectionFactory, PeerConnection};

    pub struct ObserverFactory;

    #[async_trait]
    impl ConnectionFactory for ObserverFactory {
        async fn create(
            &self,
            remote: &PeerId,
        ) -> Result<(Arc<dyn PeerConnection>, ConnectionEvents), ConnectionError> {
            tracing::debug!(peer = %remote, "no WebRTC backend, declining connection");
            Err(ConnectionError::Unsupported)
        }
    }

}

#[cfg(feature = "webrtc")]
mod backend {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use gitrtc_core::{IceCandidate, PeerId, SessionDescription};
    use gitrtc_services::{
        ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, LocalDescription,
        PeerConnection, SignalingState,
    };

    use webrtc::api::interceptor_registry::register_default_interceptors;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
    use webrtc::ice_transport::ice_server::RTCIceServer;
    use webrtc::interceptor::registry::Registry;
    use webrtc::peer_connection::configuration::RTCConfiguration;
    use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
    use webrtc::peer_connection::signaling_state::RTCSignalingState;
    use webrtc::peer_connection::RTCPeerConnection;

    const DATA_CHANNEL_LABEL: &str = "git-rtc";

    fn backend_err(e: impl std::fmt::Display) -> ConnectionError {
        ConnectionError::Backend(e.to_string())
    }

    /// `RTCSessionDescription` keeps its parsed SDP private; go through JSON.
    fn to_rtc(desc: &SessionDescription) -> Result<RTCSessionDescription, ConnectionError> {
        let value = serde_json::json!({
            "type": desc.sdp_type,
            "sdp": desc.sdp.clone().unwrap_or_default(),
        });
        serde_json::from_value(value).map_err(backend_err)
    }

    fn from_rtc(desc: &RTCSessionDescription) -> Result<SessionDescription, ConnectionError> {
        serde_json::to_value(desc)
            .and_then(serde_json::from_value)
            .map_err(backend_err)
    }

    pub struct WebRtcFactory {
        stun_servers: Vec<String>,
    }

    impl WebRtcFactory {
        pub fn new(stun_servers: Vec<String>) -> Self {
            Self { stun_servers }
        }

        async fn peer_connection(&self) -> Result<Arc<RTCPeerConnection>, ConnectionError> {
            let mut media_engine = MediaEngine::default();
            media_engine.register_default_codecs().map_err(backend_err)?;

            let registry = register_default_interceptors(Registry::new(), &mut media_engine)
                .map_err(backend_err)?;

            let api = APIBuilder::new()
                .with_media_engine(media_engine)
                .with_interceptor_registry(registry)
                .build();

            let config = RTCConfiguration {
                ice_servers: vec![RTCIceServer {
                    urls: self.stun_servers.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            };

            api.new_peer_connection(config)
                .await
                .map(Arc::new)
                .map_err(backend_err)
        }
    }

    #[async_trait]
    impl ConnectionFactory for WebRtcFactory {
        async fn create(
            &self,
            remote: &PeerId,
        ) -> Result<(Arc<dyn PeerConnection>, ConnectionEvents), ConnectionError> {
            let pc = self.peer_connection().await?;
            let (tx, rx) = mpsc::unbounded_channel();

            let events = tx.clone();
            pc.on_negotiation_needed(Box::new(move || {
                let _ = events.send(ConnectionEvent::NegotiationNeeded);
                Box::pin(async {})
            }));

            let events = tx.clone();
            pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let init = candidate
                    .and_then(|c| c.to_json().ok())
                    .and_then(|init| serde_json::to_value(init).ok());
                if let Some(value) = init {
                    let _ = events.send(ConnectionEvent::CandidateGenerated(IceCandidate(value)));
                }
                Box::pin(async {})
            }));

            let events = tx;
            pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let _ = events.send(ConnectionEvent::ConnectionStateChanged(state.to_string()));
                Box::pin(async {})
            }));

            pc.create_data_channel(DATA_CHANNEL_LABEL, None)
                .await
                .map_err(backend_err)?;

            tracing::debug!(peer = %remote, "peer connection created");
            Ok((Arc::new(WebRtcConnection { pc }), rx))
        }
    }

    pub struct WebRtcConnection {
        pc: Arc<RTCPeerConnection>,
    }

    #[async_trait]
    impl PeerConnection for WebRtcConnection {
        async fn create_offer(&self) -> Result<SessionDescription, ConnectionError> {
            let offer = self.pc.create_offer(None).await.map_err(backend_err)?;
            from_rtc(&offer)
        }

        async fn create_answer(&self) -> Result<SessionDescription, ConnectionError> {
            let answer = self.pc.create_answer(None).await.map_err(backend_err)?;
            from_rtc(&answer)
        }

        async fn set_local_description(
            &self,
            desc: LocalDescription,
        ) -> Result<(), ConnectionError> {
            let desc = match desc {
                LocalDescription::Description(d) => to_rtc(&d)?,
                LocalDescription::Rollback => serde_json::from_value(
                    serde_json::json!({ "type": "rollback", "sdp": "" }),
                )
                .map_err(backend_err)?,
            };
            self.pc.set_local_description(desc).await.map_err(backend_err)
        }

        async fn set_remote_description(
            &self,
            desc: SessionDescription,
        ) -> Result<(), ConnectionError> {
            self.pc
                .set_remote_description(to_rtc(&desc)?)
                .await
                .map_err(backend_err)
        }

        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ConnectionError> {
            let init: RTCIceCandidateInit =
                serde_json::from_value(candidate.0).map_err(backend_err)?;
            self.pc.add_ice_candidate(init).await.map_err(backend_err)
        }

        fn signaling_state(&self) -> SignalingState {
            match self.pc.signaling_state() {
                RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
                RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
                RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
                RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
                RTCSignalingState::Closed => SignalingState::Closed,
                _ => SignalingState::Stable,
            }
        }

        async fn close(&self) {
            if let Err(e) = self.pc.close().await {
                tracing::debug!(error = %e, "peer connection close failed");
            }
        }
    }
}
