//! WebRTC-backed [`PeerTransport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;

use glance_core::codec::{DescriptorKind, SessionDescriptor};
use glance_core::error::{EngineError, Result};
use glance_core::media::{LocalTrack, TrackKind};
use glance_core::transport::{
    PeerTransport, RemoteTrack, TransportEvent, TransportFactory, TransportState,
};

use crate::media::RtcLocalTrack;

/// Connection settings for the WebRTC backend.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// STUN/TURN server URLs. Empty means host candidates only, which
    /// is enough for same-machine or same-LAN sessions.
    pub ice_servers: Vec<String>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        RtcConfig {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

impl RtcConfig {
    /// No ICE servers at all; candidates stay local.
    pub fn local_only() -> Self {
        RtcConfig {
            ice_servers: Vec::new(),
        }
    }
}

fn to_rtc_description(descriptor: SessionDescriptor) -> Result<RTCSessionDescription> {
    match descriptor.kind {
        DescriptorKind::Offer => RTCSessionDescription::offer(descriptor.body),
        DescriptorKind::Answer => RTCSessionDescription::answer(descriptor.body),
    }
    .map_err(EngineError::transport)
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescriptor> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => DescriptorKind::Offer,
        RTCSdpType::Answer => DescriptorKind::Answer,
        other => {
            return Err(EngineError::transport(format!(
                "unexpected sdp type {other}"
            )))
        }
    };
    Ok(SessionDescriptor {
        kind,
        body: description.sdp,
    })
}

/// One WebRTC peer connection behind the engine's transport seam.
pub struct RtcPeerTransport {
    pc: Arc<RTCPeerConnection>,
    events: broadcast::Sender<TransportEvent>,
    gathering_done: Arc<AtomicBool>,
}

impl RtcPeerTransport {
    pub async fn connect(config: &RtcConfig) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(EngineError::transport)?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(EngineError::transport)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: if config.ice_servers.is_empty() {
                Vec::new()
            } else {
                vec![RTCIceServer {
                    urls: config.ice_servers.clone(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(EngineError::transport)?,
        );

        let (events, _) = broadcast::channel(64);
        let transport = Arc::new(RtcPeerTransport {
            pc: pc.clone(),
            events: events.clone(),
            gathering_done: Arc::new(AtomicBool::new(false)),
        });

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                debug!(%state, "peer connection state changed");
                let mapped = match state {
                    RTCPeerConnectionState::New => Some(TransportState::New),
                    RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
                    RTCPeerConnectionState::Connected => Some(TransportState::Connected),
                    RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
                    RTCPeerConnectionState::Failed => Some(TransportState::Failed),
                    RTCPeerConnectionState::Closed => Some(TransportState::Closed),
                    RTCPeerConnectionState::Unspecified => None,
                };
                if let Some(state) = mapped {
                    let _ = events.send(TransportEvent::StateChanged(state));
                }
            })
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Unspecified => {
                        warn!("ignoring remote track of unspecified kind");
                        return;
                    }
                };
                let remote = RemoteTrack {
                    stream_id: track.stream_id(),
                    label: track.id(),
                    kind,
                };
                debug!(stream = %remote.stream_id, ?kind, "remote track arrived");
                let _ = events.send(TransportEvent::TrackArrived(remote));
            })
        }));

        Ok(transport)
    }

    fn watch_gathering(&self) {
        let pc = self.pc.clone();
        let events = self.events.clone();
        let done = self.gathering_done.clone();
        tokio::spawn(async move {
            let mut complete = pc.gathering_complete_promise().await;
            let _ = complete.recv().await;
            done.store(true, Ordering::SeqCst);
            let _ = events.send(TransportEvent::GatheringComplete);
        });
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        let rtc_track = track
            .as_any()
            .downcast_ref::<RtcLocalTrack>()
            .ok_or_else(|| EngineError::transport("track is not a WebRTC local track"))?;
        self.pc
            .add_track(rtc_track.sample_track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(EngineError::transport)?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescriptor> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(EngineError::transport)?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescriptor> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(EngineError::transport)?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, descriptor: SessionDescriptor) -> Result<()> {
        self.pc
            .set_local_description(to_rtc_description(descriptor)?)
            .await
            .map_err(EngineError::transport)?;
        self.watch_gathering();
        Ok(())
    }

    async fn set_remote_description(&self, descriptor: SessionDescriptor) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc_description(descriptor)?)
            .await
            .map_err(EngineError::transport)
    }

    async fn local_description(&self) -> Option<SessionDescriptor> {
        let description = self.pc.local_description().await?;
        from_rtc_description(description).ok()
    }

    async fn is_gathering_complete(&self) -> bool {
        self.gathering_done.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(EngineError::transport)
    }
}

/// Makes one [`RtcPeerTransport`] per negotiation.
pub struct RtcTransportFactory {
    config: RtcConfig,
}

impl RtcTransportFactory {
    pub fn new(config: RtcConfig) -> Arc<Self> {
        Arc::new(RtcTransportFactory { config })
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>> {
        let transport = RtcPeerTransport::connect(&self.config).await?;
        Ok(transport as Arc<dyn PeerTransport>)
    }
}
