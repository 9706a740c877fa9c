//! End-to-end session flows over the in-process dummy backend.

use std::sync::Arc;
use std::time::Duration;

use glance_core::codec::{self, DescriptorKind, SessionDescriptor};
use glance_core::dummy::{DummyMediaSource, DummyTransportFactory};
use glance_core::error::{EngineError, MediaDevice};
use glance_core::media::TrackKind;
use glance_core::router::TrackClassification;
use glance_core::session::{
    ConnectionSession, Role, SessionConfig, SessionEvent, SessionSlot, SessionState,
};
use glance_core::transport::{RemoteTrack, TransportState};
use tokio::sync::broadcast;

fn fast_config() -> SessionConfig {
    SessionConfig {
        gathering_deadline: Duration::from_millis(200),
        negotiation_deadline: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

fn session(
    role: Role,
    config: SessionConfig,
    media: DummyMediaSource,
    auto_gather: bool,
    auto_connect: bool,
) -> (ConnectionSession, Arc<DummyTransportFactory>) {
    let factory = DummyTransportFactory::new(auto_gather, auto_connect);
    let session = ConnectionSession::new(role, config, Arc::new(media), factory.clone());
    (session, factory)
}

async fn wait_for_state(rx: &mut broadcast::Receiver<SessionEvent>, wanted: SessionState) {
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::StateChanged(state)) if state == wanted => return,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended before reaching {wanted:?}: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"));
}

#[tokio::test]
async fn test_host_flow_reaches_connected() {
    let (host, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        true,
    );
    let mut events = host.subscribe();

    host.acquire_media().await.expect("acquire media");
    assert_eq!(host.state().await, SessionState::MediaReady);

    let offer = host.start_offer().await.expect("start offer");
    let decoded = codec::decode(offer.as_str()).expect("decode offer");
    assert_eq!(decoded.kind, DescriptorKind::Offer);
    assert_eq!(host.state().await, SessionState::AwaitingRemote);

    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    let returned = host.accept_remote(answer.as_str()).await.expect("accept answer");
    assert!(returned.is_none());

    wait_for_state(&mut events, SessionState::Connected).await;
}

#[tokio::test]
async fn test_viewer_flow_produces_answer() {
    let (viewer, _factory) = session(
        Role::Viewer,
        fast_config(),
        DummyMediaSource::new(),
        true,
        true,
    );
    let mut events = viewer.subscribe();

    viewer.acquire_media().await.expect("acquire media");

    let offer = codec::encode(&SessionDescriptor::offer("v=0\r\ns=offer\r\n"));
    let answer = viewer
        .accept_remote(offer.as_str())
        .await
        .expect("accept offer")
        .expect("answer payload");
    let decoded = codec::decode(answer.as_str()).expect("decode answer");
    assert_eq!(decoded.kind, DescriptorKind::Answer);

    wait_for_state(&mut events, SessionState::Connected).await;
}

#[tokio::test]
async fn test_malformed_payload_leaves_state_intact() {
    let (host, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");

    let err = host.accept_remote("not a payload !!!").await.unwrap_err();
    assert!(matches!(err, EngineError::Decode(_)));
    assert_eq!(host.state().await, SessionState::AwaitingRemote);

    // A corrected payload still goes through.
    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    host.accept_remote(answer.as_str()).await.expect("retry accept");
    assert_eq!(host.state().await, SessionState::Negotiating);
}

#[tokio::test]
async fn test_wrong_kind_payload_is_rejected() {
    let (host, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");

    let offer = codec::encode(&SessionDescriptor::offer("v=0\r\ns=offer\r\n"));
    let err = host.accept_remote(offer.as_str()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnexpectedPayload {
            expected: DescriptorKind::Answer,
            got: DescriptorKind::Offer,
        }
    ));
    assert_eq!(host.state().await, SessionState::AwaitingRemote);
}

#[tokio::test]
async fn test_host_screen_denial_is_fatal() {
    let (host, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new().deny_screen(),
        true,
        false,
    );
    let err = host.acquire_media().await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert_eq!(host.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_camera_denial_is_not_fatal_for_host() {
    let (host, factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new().deny_user_media(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    assert_eq!(host.state().await, SessionState::MediaReady);

    // Only the screen tracks made it onto the transport.
    host.start_offer().await.expect("start offer");
    let transport = factory.last().expect("transport created");
    assert_eq!(transport.attached_tracks().len(), 1);
}

#[tokio::test]
async fn test_gathering_deadline_ships_partial_payload() {
    let config = SessionConfig {
        gathering_deadline: Duration::from_millis(50),
        ..fast_config()
    };
    let (host, _factory) = session(Role::Host, config, DummyMediaSource::new(), false, false);
    let mut events = host.subscribe();

    host.acquire_media().await.expect("acquire media");
    let payload = host.start_offer().await.expect("start offer");
    assert!(!payload.as_str().is_empty());

    let resolved = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.expect("event") {
                SessionEvent::GatheringResolved { complete } => return complete,
                _ => continue,
            }
        }
    })
    .await
    .expect("gathering resolved event");
    assert!(!resolved);
}

#[tokio::test]
async fn test_negotiation_deadline_fails_session() {
    let config = SessionConfig {
        negotiation_deadline: Duration::from_millis(100),
        ..fast_config()
    };
    let (host, _factory) = session(Role::Host, config, DummyMediaSource::new(), true, false);
    let mut events = host.subscribe();

    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");
    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    host.accept_remote(answer.as_str()).await.expect("accept answer");

    wait_for_state(&mut events, SessionState::Failed).await;
}

#[tokio::test]
async fn test_remote_screen_track_is_classified() {
    let (viewer, factory) = session(
        Role::Viewer,
        fast_config(),
        DummyMediaSource::new(),
        true,
        true,
    );
    let mut events = viewer.subscribe();

    viewer.acquire_media().await.expect("acquire media");
    let offer = codec::encode(&SessionDescriptor::offer("v=0\r\ns=offer\r\n"));
    viewer.accept_remote(offer.as_str()).await.expect("accept offer");

    let transport = factory.last().expect("transport created");
    transport.emit_track(RemoteTrack {
        stream_id: "screen-ab12".to_string(),
        label: "screen".to_string(),
        kind: TrackKind::Video,
    });

    let routed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.expect("event") {
                SessionEvent::TrackClassified(routed) => return routed,
                _ => continue,
            }
        }
    })
    .await
    .expect("track classified event");
    assert_eq!(routed.classification, TrackClassification::ScreenVideo);
}

#[tokio::test]
async fn test_disconnect_during_negotiation_is_surfaced() {
    let (host, factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    let mut events = host.subscribe();

    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");
    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    host.accept_remote(answer.as_str()).await.expect("accept answer");
    assert_eq!(host.state().await, SessionState::Negotiating);

    let transport = factory.last().expect("transport");
    transport.emit_state(TransportState::Disconnected);

    wait_for_state(&mut events, SessionState::Disconnected).await;

    // The transport recovering still brings the session back up.
    transport.emit_state(TransportState::Connected);
    wait_for_state(&mut events, SessionState::Connected).await;
}

#[tokio::test]
async fn test_tracks_route_while_gathering_is_pending() {
    let config = SessionConfig {
        gathering_deadline: Duration::from_secs(5),
        ..fast_config()
    };
    let (host, factory) = session(Role::Host, config, DummyMediaSource::new(), false, false);
    let mut events = host.subscribe();
    host.acquire_media().await.expect("acquire media");

    let offer_task = tokio::spawn({
        let host = host.clone();
        async move { host.start_offer().await }
    });

    // Hand the transport a remote track while the offer is still
    // waiting on candidate gathering.
    let transport = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(transport) = factory.last() {
                return transport;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("transport created");
    transport.emit_track(RemoteTrack {
        stream_id: "screen-cd34".to_string(),
        label: "screen".to_string(),
        kind: TrackKind::Video,
    });

    let routed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.expect("event") {
                SessionEvent::TrackClassified(routed) => return routed,
                _ => continue,
            }
        }
    })
    .await
    .expect("track classified while gathering pending");
    assert_eq!(routed.classification, TrackClassification::ScreenVideo);

    transport.complete_gathering();
    offer_task
        .await
        .expect("offer task")
        .expect("start offer");
    assert_eq!(host.state().await, SessionState::AwaitingRemote);
}

#[tokio::test]
async fn test_toggle_microphone_skips_screen_tracks() {
    let (host, factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");
    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    host.accept_remote(answer.as_str()).await.expect("accept answer");

    let now_enabled = host.toggle_microphone().await.expect("toggle");
    assert!(!now_enabled);
    let again = host.toggle_microphone().await.expect("toggle");
    assert!(again);

    // The screen video was never disabled by the camera toggle.
    host.toggle_camera().await.expect("toggle camera");
    let transport = factory.last().expect("transport");
    let screen = transport
        .attached_tracks()
        .into_iter()
        .find(|t| t.stream_id().starts_with("screen-"))
        .expect("screen track");
    assert!(screen.is_enabled());
}

#[tokio::test]
async fn test_toggle_requires_active_negotiation() {
    let (host, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    let err = host.toggle_microphone().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn test_toggle_without_device_reports_not_captured() {
    let config = SessionConfig {
        camera: None,
        microphone: false,
        ..fast_config()
    };
    let (host, _factory) = session(Role::Host, config, DummyMediaSource::new(), true, false);
    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");
    let answer = codec::encode(&SessionDescriptor::answer("v=0\r\ns=answer\r\n"));
    host.accept_remote(answer.as_str()).await.expect("accept answer");

    let err = host.toggle_microphone().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DeviceNotCaptured(MediaDevice::Microphone)
    ));
    let err = host.toggle_camera().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DeviceNotCaptured(MediaDevice::Camera)
    ));
}

#[tokio::test]
async fn test_close_is_idempotent_and_stops_tracks() {
    let (host, factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    host.acquire_media().await.expect("acquire media");
    host.start_offer().await.expect("start offer");
    let transport = factory.last().expect("transport");
    let tracks = transport.attached_tracks();

    host.close().await;
    assert_eq!(host.state().await, SessionState::Closed);
    assert!(transport.is_closed());
    assert!(tracks.iter().all(|t| t.is_stopped()));

    host.close().await;
    assert_eq!(host.state().await, SessionState::Closed);
}

#[tokio::test]
async fn test_slot_closes_previous_session() {
    let slot = SessionSlot::new();

    let (first, first_factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    first.acquire_media().await.expect("acquire media");
    first.start_offer().await.expect("start offer");
    slot.begin(first.clone()).await;

    let (second, _factory) = session(
        Role::Host,
        fast_config(),
        DummyMediaSource::new(),
        true,
        false,
    );
    slot.begin(second).await;

    assert_eq!(first.state().await, SessionState::Closed);
    assert!(first_factory.last().expect("transport").is_closed());
    assert!(slot.active().await.is_some());

    slot.end().await;
    assert!(slot.active().await.is_none());
}
