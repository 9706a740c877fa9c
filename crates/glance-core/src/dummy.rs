//! In-process transport and media backends.
//!
//! These run the whole engine without any network or capture hardware.
//! Tests script them directly; they also back headless demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::codec::SessionDescriptor;
use crate::error::{EngineError, MediaDevice, Result};
use crate::media::{CameraConfig, LocalTrack, MediaSource, ScreenConfig, TrackKind, SCREEN_STREAM_PREFIX};
use crate::transport::{
    PeerTransport, RemoteTrack, TransportEvent, TransportFactory, TransportState,
};

/// A local track backed by nothing.
pub struct DummyTrack {
    kind: TrackKind,
    label: String,
    stream_id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl DummyTrack {
    pub fn new(kind: TrackKind, label: &str, stream_id: &str) -> Arc<Self> {
        Arc::new(DummyTrack {
            kind,
            label: label.to_string(),
            stream_id: stream_id.to_string(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }
}

impl LocalTrack for DummyTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Scriptable media source.
///
/// By default every acquisition succeeds. Individual devices can be
/// made to fail to exercise the engine's error paths.
#[derive(Default)]
pub struct DummyMediaSource {
    deny_screen: bool,
    deny_user_media: bool,
}

impl DummyMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_screen(mut self) -> Self {
        self.deny_screen = true;
        self
    }

    pub fn deny_user_media(mut self) -> Self {
        self.deny_user_media = true;
        self
    }
}

#[async_trait]
impl MediaSource for DummyMediaSource {
    async fn acquire_screen(&self, config: &ScreenConfig) -> Result<Vec<Arc<dyn LocalTrack>>> {
        if self.deny_screen {
            return Err(EngineError::PermissionDenied(MediaDevice::Screen));
        }
        let stream = format!("{SCREEN_STREAM_PREFIX}dummy");
        let mut tracks: Vec<Arc<dyn LocalTrack>> =
            vec![DummyTrack::new(TrackKind::Video, "screen", &stream)];
        if config.capture_system_audio {
            tracks.push(DummyTrack::new(TrackKind::Audio, "system-audio", &stream));
        }
        Ok(tracks)
    }

    async fn acquire_user_media(
        &self,
        camera: Option<&CameraConfig>,
        microphone: bool,
    ) -> Result<Vec<Arc<dyn LocalTrack>>> {
        if self.deny_user_media {
            return Err(EngineError::PermissionDenied(MediaDevice::Camera));
        }
        let mut tracks: Vec<Arc<dyn LocalTrack>> = Vec::new();
        if camera.is_some() {
            tracks.push(DummyTrack::new(TrackKind::Video, "camera", "user-dummy"));
        }
        if microphone {
            tracks.push(DummyTrack::new(TrackKind::Audio, "microphone", "user-dummy"));
        }
        Ok(tracks)
    }
}

/// Scriptable peer transport.
pub struct DummyTransport {
    local: Mutex<Option<SessionDescriptor>>,
    remote: Mutex<Option<SessionDescriptor>>,
    tracks: Mutex<Vec<Arc<dyn LocalTrack>>>,
    gathering_complete: AtomicBool,
    closed: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
    /// Mark gathering complete as soon as a local description is set.
    auto_gather: bool,
    /// Report `Connected` once both descriptions are applied.
    auto_connect: bool,
}

impl DummyTransport {
    pub fn new(auto_gather: bool, auto_connect: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(DummyTransport {
            local: Mutex::new(None),
            remote: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            gathering_complete: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events,
            auto_gather,
            auto_connect,
        })
    }

    pub fn complete_gathering(&self) {
        self.gathering_complete.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::GatheringComplete);
    }

    pub fn emit_state(&self, state: TransportState) {
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    pub fn emit_track(&self, track: RemoteTrack) {
        let _ = self.events.send(TransportEvent::TrackArrived(track));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn attached_tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescriptor> {
        self.remote.lock().unwrap().clone()
    }

    fn maybe_connect(&self) {
        if !self.auto_connect {
            return;
        }
        let both = self.local.lock().unwrap().is_some() && self.remote.lock().unwrap().is_some();
        if both {
            let _ = self.events.send(TransportEvent::StateChanged(TransportState::Connecting));
            let _ = self.events.send(TransportEvent::StateChanged(TransportState::Connected));
        }
    }
}

#[async_trait]
impl PeerTransport for DummyTransport {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        self.tracks.lock().unwrap().push(track);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescriptor> {
        let tracks = self.tracks.lock().unwrap().len();
        Ok(SessionDescriptor::offer(format!(
            "v=0\r\ns=dummy offer with {tracks} tracks\r\n"
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescriptor> {
        if self.remote.lock().unwrap().is_none() {
            return Err(EngineError::transport("no remote description to answer"));
        }
        let tracks = self.tracks.lock().unwrap().len();
        Ok(SessionDescriptor::answer(format!(
            "v=0\r\ns=dummy answer with {tracks} tracks\r\n"
        )))
    }

    async fn set_local_description(&self, descriptor: SessionDescriptor) -> Result<()> {
        *self.local.lock().unwrap() = Some(descriptor);
        if self.auto_gather {
            self.complete_gathering();
        }
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(&self, descriptor: SessionDescriptor) -> Result<()> {
        *self.remote.lock().unwrap() = Some(descriptor);
        self.maybe_connect();
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescriptor> {
        self.local.lock().unwrap().clone()
    }

    async fn is_gathering_complete(&self) -> bool {
        self.gathering_complete.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::StateChanged(TransportState::Closed));
        Ok(())
    }
}

/// Factory that records every transport it creates so tests can drive
/// them after the session takes ownership.
pub struct DummyTransportFactory {
    auto_gather: bool,
    auto_connect: bool,
    created: Mutex<Vec<Arc<DummyTransport>>>,
}

impl DummyTransportFactory {
    pub fn new(auto_gather: bool, auto_connect: bool) -> Arc<Self> {
        Arc::new(DummyTransportFactory {
            auto_gather,
            auto_connect,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<DummyTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Arc<DummyTransport>> {
        self.created.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for DummyTransportFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>> {
        let transport = DummyTransport::new(self.auto_gather, self.auto_connect);
        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
