//! Local media acquisition seams.
//!
//! The engine never touches capture hardware directly; a [`MediaSource`]
//! implementation hands it [`LocalTrack`] handles. The screen share is
//! tagged through the track's stream id so the remote side can tell the
//! shared surface apart from camera video without out-of-band signaling.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Stream-id prefix marking tracks that belong to the shared screen.
pub const SCREEN_STREAM_PREFIX: &str = "screen-";

/// Whether a stream id tags its tracks as part of the shared screen.
pub fn is_screen_stream(stream_id: &str) -> bool {
    stream_id.starts_with(SCREEN_STREAM_PREFIX)
}

/// The payload class of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Capture parameters for the participant's camera.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            width: 640,
            height: 480,
            fps: 15,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Capture parameters for the shared screen.
#[derive(Debug, Clone, Default)]
pub struct ScreenConfig {
    /// Also capture system audio alongside the screen, where the
    /// platform allows it.
    pub capture_system_audio: bool,
}

/// A handle to one locally captured track.
///
/// Tracks stay attached to the transport when muted; [`set_enabled`]
/// only toggles whether frames flow. [`stop`] releases the underlying
/// device and is final.
///
/// [`set_enabled`]: LocalTrack::set_enabled
/// [`stop`]: LocalTrack::stop
pub trait LocalTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Short human-readable label, e.g. `"camera"` or `"screen"`.
    fn label(&self) -> &str;

    /// The stream this track belongs to. Screen tracks carry the
    /// [`SCREEN_STREAM_PREFIX`] tag here.
    fn stream_id(&self) -> &str;

    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;

    fn stop(&self);
    fn is_stopped(&self) -> bool;

    /// Downcast hook so a transport backend can recover its own
    /// concrete track type.
    fn as_any(&self) -> &dyn Any;
}

/// Provider of local capture tracks.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Capture the screen. Returns the video track plus, optionally, a
    /// system-audio track sharing the same screen-tagged stream id.
    async fn acquire_screen(&self, config: &ScreenConfig) -> Result<Vec<Arc<dyn LocalTrack>>>;

    /// Capture camera and/or microphone. Either config half may be
    /// absent. Errors here are per-device: the caller decides whether
    /// a denial is fatal.
    async fn acquire_user_media(
        &self,
        camera: Option<&CameraConfig>,
        microphone: bool,
    ) -> Result<Vec<Arc<dyn LocalTrack>>>;
}
