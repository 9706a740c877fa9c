//! Peer transport seam.
//!
//! The session state machine drives negotiation through [`PeerTransport`]
//! without knowing which RTC stack sits underneath. Backends surface
//! asynchronous activity as [`TransportEvent`]s on a broadcast channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::codec::SessionDescriptor;
use crate::error::Result;
use crate::media::{LocalTrack, TrackKind};

/// Connection lifecycle of the underlying peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// A media track received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Remote stream id; carries the screen tag for shared-surface tracks.
    pub stream_id: String,
    pub label: String,
    pub kind: TrackKind,
}

/// Asynchronous transport activity.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(TransportState),
    TrackArrived(RemoteTrack),
    /// Candidate gathering finished for the current local description.
    GatheringComplete,
}

/// One peer-to-peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach a local track before negotiation so it is represented in
    /// the generated description.
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescriptor>;
    async fn create_answer(&self) -> Result<SessionDescriptor>;

    async fn set_local_description(&self, descriptor: SessionDescriptor) -> Result<()>;
    async fn set_remote_description(&self, descriptor: SessionDescriptor) -> Result<()>;

    /// The local description including any candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescriptor>;

    /// Whether candidate gathering already finished. Checked before
    /// waiting on events so a completion that fired before the caller
    /// subscribed is not missed.
    async fn is_gathering_complete(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Tear down the connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Creates transports on demand; the session makes one per negotiation.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>>;
}
