//! The connection session state machine.
//!
//! One [`ConnectionSession`] covers a single share from media capture
//! through negotiation to teardown. The host captures its screen,
//! produces an offer payload, and waits for the answer; the viewer
//! consumes the offer and produces the answer. Both sides then race a
//! negotiation deadline against the transport's connected signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{self, DescriptorKind, EncodedPayload};
use crate::error::{EngineError, MediaDevice, Result};
use crate::gathering::{GatheringCoordinator, DEFAULT_GATHERING_DEADLINE};
use crate::media::{is_screen_stream, CameraConfig, LocalTrack, MediaSource, ScreenConfig, TrackKind};
use crate::router::{MediaTrackRouter, RoutedTrack};
use crate::transport::{PeerTransport, TransportEvent, TransportFactory, TransportState};

/// How long negotiation may run before the session gives up.
pub const DEFAULT_NEGOTIATION_DEADLINE: Duration = Duration::from_secs(30);

/// Which side of the share this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Shares the screen and creates the offer.
    Host,
    /// Watches the share and creates the answer.
    Viewer,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created; no media captured yet.
    Idle,
    /// Local media captured and ready to attach.
    MediaReady,
    /// Local description set; gathering candidates.
    LocalDescriptionPending,
    /// Waiting on the peer payload: the host has shipped its offer,
    /// or the viewer is applying a received offer.
    AwaitingRemote,
    /// Both descriptions applied; waiting for the transport to connect.
    Negotiating,
    Connected,
    /// Transport connectivity lost, during or after negotiation. The
    /// transport may still recover and report connected again.
    Disconnected,
    Failed,
    Closed,
}

impl SessionState {
    fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

/// Observable session activity.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// An encoded descriptor is ready to hand to the signaling layer.
    PayloadReady(EncodedPayload),
    /// A remote track was classified and grouped.
    TrackClassified(RoutedTrack),
    /// Candidate gathering resolved, completely or at the deadline.
    GatheringResolved { complete: bool },
    Error(String),
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Camera capture; `None` disables the camera.
    pub camera: Option<CameraConfig>,
    pub microphone: bool,
    pub screen: ScreenConfig,
    pub gathering_deadline: Duration,
    pub negotiation_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            camera: Some(CameraConfig::default()),
            microphone: true,
            screen: ScreenConfig::default(),
            gathering_deadline: DEFAULT_GATHERING_DEADLINE,
            negotiation_deadline: DEFAULT_NEGOTIATION_DEADLINE,
        }
    }
}

struct Inner {
    state: SessionState,
    transport: Option<Arc<dyn PeerTransport>>,
    local_tracks: Vec<Arc<dyn LocalTrack>>,
    router: MediaTrackRouter,
    pump: Option<JoinHandle<()>>,
    deadline_timer: Option<JoinHandle<()>>,
    /// The transport has reported `Connected` and not yet dropped it.
    /// Tracked separately because the signal can arrive while the
    /// session is still resolving its local payload.
    transport_connected: bool,
}

struct Shared {
    role: Role,
    config: SessionConfig,
    media: Arc<dyn MediaSource>,
    factory: Arc<dyn TransportFactory>,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

/// A single share session. Cheap to clone; all clones drive the same
/// underlying session.
#[derive(Clone)]
pub struct ConnectionSession {
    shared: Arc<Shared>,
}

impl ConnectionSession {
    pub fn new(
        role: Role,
        config: SessionConfig,
        media: Arc<dyn MediaSource>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        ConnectionSession {
            shared: Arc::new(Shared {
                role,
                config,
                media,
                factory,
                events,
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    transport: None,
                    local_tracks: Vec::new(),
                    router: MediaTrackRouter::new(role),
                    pump: None,
                    deadline_timer: None,
                    transport_connected: false,
                }),
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Capture local media per the session config.
    ///
    /// For the host the screen capture is mandatory: its failure leaves
    /// the session in `Idle` and returns the error. Camera and
    /// microphone denials are never fatal for either role; the session
    /// logs them, surfaces an [`SessionEvent::Error`], and continues
    /// without the device.
    pub async fn acquire_media(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if inner.state != SessionState::Idle {
            return Err(EngineError::InvalidState {
                op: "acquire media",
                state: inner.state,
            });
        }

        if shared.role == Role::Host {
            match shared.media.acquire_screen(&shared.config.screen).await {
                Ok(tracks) => inner.local_tracks.extend(tracks),
                Err(e) => {
                    warn!(error = %e, "screen capture failed");
                    let _ = shared.events.send(SessionEvent::Error(e.to_string()));
                    return Err(e);
                }
            }
        }

        if shared.config.camera.is_some() || shared.config.microphone {
            match shared
                .media
                .acquire_user_media(shared.config.camera.as_ref(), shared.config.microphone)
                .await
            {
                Ok(tracks) => inner.local_tracks.extend(tracks),
                Err(e) => {
                    warn!(error = %e, "camera/microphone capture failed, continuing without");
                    let _ = shared.events.send(SessionEvent::Error(e.to_string()));
                }
            }
        }

        set_state(shared, &mut inner, SessionState::MediaReady);
        Ok(())
    }

    /// Host only: attach local tracks, produce the offer, and resolve
    /// the sendable payload once gathering settles.
    pub async fn start_offer(&self) -> Result<EncodedPayload> {
        let shared = &self.shared;
        let transport = {
            let mut inner = shared.inner.lock().await;
            if shared.role != Role::Host || inner.state != SessionState::MediaReady {
                return Err(EngineError::InvalidState {
                    op: "create offer",
                    state: inner.state,
                });
            }

            let transport = self.attach_transport(&mut inner).await?;
            let offer = transport.create_offer().await?;
            transport.set_local_description(offer).await?;
            set_state(shared, &mut inner, SessionState::LocalDescriptionPending);
            transport
        };

        // Gathering can run for seconds; the lock stays free so the
        // event pump keeps draining transport events meanwhile.
        let payload = self.resolve_payload(transport.as_ref()).await?;

        let mut inner = shared.inner.lock().await;
        if inner.state != SessionState::LocalDescriptionPending {
            return Err(EngineError::InvalidState {
                op: "create offer",
                state: inner.state,
            });
        }
        set_state(shared, &mut inner, SessionState::AwaitingRemote);
        drop(inner);
        let _ = shared.events.send(SessionEvent::PayloadReady(payload.clone()));
        Ok(payload)
    }

    /// Apply the peer's encoded payload.
    ///
    /// The host expects an answer and returns `None`; the viewer
    /// expects an offer and returns its answer payload. A decode
    /// failure or a payload of the wrong kind changes nothing, so the
    /// caller may retry with corrected input.
    pub async fn accept_remote(&self, token: &str) -> Result<Option<EncodedPayload>> {
        let descriptor = codec::decode(token)?;
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        match shared.role {
            Role::Host => {
                if inner.state != SessionState::AwaitingRemote {
                    return Err(EngineError::InvalidState {
                        op: "accept answer",
                        state: inner.state,
                    });
                }
                if descriptor.kind != DescriptorKind::Answer {
                    return Err(EngineError::UnexpectedPayload {
                        expected: DescriptorKind::Answer,
                        got: descriptor.kind,
                    });
                }
                let transport = inner
                    .transport
                    .clone()
                    .ok_or_else(|| EngineError::transport("no transport for remote description"))?;
                transport.set_remote_description(descriptor).await?;
                set_state(shared, &mut inner, SessionState::Negotiating);
                self.arm_negotiation_deadline(&mut inner);
                Ok(None)
            }
            Role::Viewer => {
                if inner.state != SessionState::MediaReady {
                    return Err(EngineError::InvalidState {
                        op: "accept offer",
                        state: inner.state,
                    });
                }
                if descriptor.kind != DescriptorKind::Offer {
                    return Err(EngineError::UnexpectedPayload {
                        expected: DescriptorKind::Offer,
                        got: descriptor.kind,
                    });
                }
                set_state(shared, &mut inner, SessionState::AwaitingRemote);

                let transport = self.attach_transport(&mut inner).await?;
                transport.set_remote_description(descriptor).await?;
                let answer = transport.create_answer().await?;
                transport.set_local_description(answer).await?;
                set_state(shared, &mut inner, SessionState::LocalDescriptionPending);
                drop(inner);

                // Same as the offer side: keep the lock free while
                // gathering resolves.
                let payload = self.resolve_payload(transport.as_ref()).await?;

                let mut inner = shared.inner.lock().await;
                if inner.state != SessionState::LocalDescriptionPending {
                    return Err(EngineError::InvalidState {
                        op: "accept offer",
                        state: inner.state,
                    });
                }
                set_state(shared, &mut inner, SessionState::Negotiating);
                // The transport may have connected while the answer was
                // still resolving; in that case the connected signal
                // already came and went.
                if inner.transport_connected {
                    set_state(shared, &mut inner, SessionState::Connected);
                } else {
                    self.arm_negotiation_deadline(&mut inner);
                }
                drop(inner);
                let _ = shared.events.send(SessionEvent::PayloadReady(payload.clone()));
                Ok(Some(payload))
            }
        }
    }

    /// Toggle the local microphone. Returns the new enabled state.
    pub async fn toggle_microphone(&self) -> Result<bool> {
        self.toggle_tracks(TrackKind::Audio, "toggle microphone", MediaDevice::Microphone)
            .await
    }

    /// Toggle the local camera. Screen tracks are never affected.
    pub async fn toggle_camera(&self) -> Result<bool> {
        self.toggle_tracks(TrackKind::Video, "toggle camera", MediaDevice::Camera)
            .await
    }

    /// Tear everything down. Safe to call from any state, repeatedly.
    pub async fn close(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if inner.state == SessionState::Closed {
            return;
        }

        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        if let Some(timer) = inner.deadline_timer.take() {
            timer.abort();
        }
        for track in inner.local_tracks.drain(..) {
            track.stop();
        }
        if let Some(transport) = inner.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "transport close reported an error");
            }
        }
        set_state(shared, &mut inner, SessionState::Closed);
        info!("session closed");
    }

    async fn attach_transport(&self, inner: &mut Inner) -> Result<Arc<dyn PeerTransport>> {
        let shared = &self.shared;
        let transport = shared.factory.create().await?;
        // Subscribe before handing the receiver to the pump task, so
        // events emitted before its first poll are buffered, not lost.
        let events = transport.subscribe();
        inner.pump = Some(spawn_event_pump(shared.clone(), events));
        inner.transport_connected = false;
        for track in &inner.local_tracks {
            transport.add_track(track.clone()).await?;
        }
        inner.transport = Some(transport.clone());
        Ok(transport)
    }

    async fn resolve_payload(&self, transport: &dyn PeerTransport) -> Result<EncodedPayload> {
        let shared = &self.shared;
        let coordinator = GatheringCoordinator::new(shared.config.gathering_deadline);
        let resolved = coordinator.resolve(transport).await?;
        let _ = shared.events.send(SessionEvent::GatheringResolved {
            complete: resolved.complete,
        });
        Ok(codec::encode(&resolved.descriptor))
    }

    fn arm_negotiation_deadline(&self, inner: &mut Inner) {
        let shared = self.shared.clone();
        let deadline = shared.config.negotiation_deadline;
        inner.deadline_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let mut inner = shared.inner.lock().await;
            if inner.state == SessionState::Negotiating {
                warn!(deadline_secs = deadline.as_secs(), "negotiation deadline expired");
                let _ = shared
                    .events
                    .send(SessionEvent::Error(EngineError::NegotiationTimeout.to_string()));
                set_state(&shared, &mut inner, SessionState::Failed);
            }
        }));
    }

    async fn toggle_tracks(
        &self,
        kind: TrackKind,
        op: &'static str,
        device: MediaDevice,
    ) -> Result<bool> {
        let shared = &self.shared;
        let inner = shared.inner.lock().await;
        if !matches!(inner.state, SessionState::Negotiating | SessionState::Connected) {
            return Err(EngineError::InvalidState {
                op,
                state: inner.state,
            });
        }

        let tracks: Vec<_> = inner
            .local_tracks
            .iter()
            .filter(|t| t.kind() == kind && !is_screen_stream(t.stream_id()))
            .collect();
        let first = tracks
            .first()
            .ok_or(EngineError::DeviceNotCaptured(device))?;

        let enabled = !first.is_enabled();
        for track in &tracks {
            track.set_enabled(enabled);
        }
        debug!(?kind, enabled, "toggled local tracks");
        Ok(enabled)
    }
}

fn set_state(shared: &Shared, inner: &mut Inner, state: SessionState) {
    if inner.state == state {
        return;
    }
    debug!(from = ?inner.state, to = ?state, "session state change");
    inner.state = state;
    let _ = shared.events.send(SessionEvent::StateChanged(state));
}

/// Forwards transport events into session state and track routing.
fn spawn_event_pump(
    shared: Arc<Shared>,
    mut events: broadcast::Receiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let flush_at = shared.inner.lock().await.router.next_flush_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => handle_transport_event(&shared, event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "transport event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = sleep_until_opt(flush_at) => {
                    let released = {
                        let mut inner = shared.inner.lock().await;
                        inner.router.flush_expired(Instant::now())
                    };
                    for routed in released {
                        let _ = shared.events.send(SessionEvent::TrackClassified(routed));
                    }
                }
            }
        }
    })
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}

async fn handle_transport_event(shared: &Arc<Shared>, event: TransportEvent) {
    match event {
        TransportEvent::TrackArrived(track) => {
            let routed = {
                let mut inner = shared.inner.lock().await;
                inner.router.route(track, Instant::now())
            };
            for routed in routed {
                let _ = shared.events.send(SessionEvent::TrackClassified(routed));
            }
        }
        TransportEvent::StateChanged(state) => {
            let mut inner = shared.inner.lock().await;
            match state {
                TransportState::Connected => {
                    inner.transport_connected = true;
                    if matches!(
                        inner.state,
                        SessionState::Negotiating | SessionState::Disconnected
                    ) {
                        if let Some(timer) = inner.deadline_timer.take() {
                            timer.abort();
                        }
                        set_state(shared, &mut inner, SessionState::Connected);
                        info!("peer connection established");
                    }
                }
                TransportState::Disconnected => {
                    inner.transport_connected = false;
                    if matches!(
                        inner.state,
                        SessionState::Connected | SessionState::Negotiating
                    ) {
                        set_state(shared, &mut inner, SessionState::Disconnected);
                    }
                }
                TransportState::Failed => {
                    if !inner.state.is_terminal() {
                        let _ = shared
                            .events
                            .send(SessionEvent::Error("transport failed".to_string()));
                        set_state(shared, &mut inner, SessionState::Failed);
                    }
                }
                TransportState::New | TransportState::Connecting | TransportState::Closed => {}
            }
        }
        // Consumed by the gathering coordinator on its own subscription.
        TransportEvent::GatheringComplete => {}
    }
}

/// Holds the single active session, closing any predecessor before a
/// replacement begins.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<ConnectionSession>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` as the active one. A previously active session
    /// is closed first so its devices and transport are released.
    pub async fn begin(&self, session: ConnectionSession) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!("closing previous session before starting a new one");
            previous.close().await;
        }
        *current = Some(session);
    }

    /// Close and release the active session, if any.
    pub async fn end(&self) {
        let mut current = self.current.lock().await;
        if let Some(session) = current.take() {
            session.close().await;
        }
    }

    pub async fn active(&self) -> Option<ConnectionSession> {
        self.current.lock().await.clone()
    }
}
