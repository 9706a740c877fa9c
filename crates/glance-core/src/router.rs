//! Remote track classification and grouping.
//!
//! Tracks arrive from the transport one at a time with no ordering
//! guarantee. The router decides what each one is (shared screen,
//! camera, microphone) and which camera group an audio track belongs
//! to, holding early audio briefly so a camera video arriving just
//! behind it can claim it.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::media::{is_screen_stream, TrackKind};
use crate::session::Role;
use crate::transport::RemoteTrack;

/// How long an unmatched audio track waits for its camera video.
pub const AUDIO_GROUP_GRACE: Duration = Duration::from_millis(500);

/// What a remote track turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackClassification {
    /// The shared screen surface.
    ScreenVideo,
    /// A participant's camera.
    CameraVideo,
    /// A participant's microphone (or system audio folded into a group).
    MicrophoneAudio,
    /// Audio that never found a camera group before the grace expired.
    Unknown,
}

/// A classified remote track, grouped where applicable.
#[derive(Debug, Clone)]
pub struct RoutedTrack {
    pub track: RemoteTrack,
    pub classification: TrackClassification,
    /// Camera group index; screen video carries no group.
    pub group: Option<u32>,
}

/// Per-session remote track router.
pub struct MediaTrackRouter {
    role: Role,
    screen_classified: bool,
    camera_groups: u32,
    held_audio: Vec<(RemoteTrack, Instant)>,
    grace: Duration,
}

impl MediaTrackRouter {
    pub fn new(role: Role) -> Self {
        Self::with_grace(role, AUDIO_GROUP_GRACE)
    }

    pub fn with_grace(role: Role, grace: Duration) -> Self {
        MediaTrackRouter {
            role,
            screen_classified: false,
            camera_groups: 0,
            held_audio: Vec::new(),
            grace,
        }
    }

    /// Route one arriving track. Returns the routed tracks this arrival
    /// produced: usually one, more when a camera video releases held
    /// audio into its group, none when audio is held for grouping.
    pub fn route(&mut self, track: RemoteTrack, now: Instant) -> Vec<RoutedTrack> {
        match track.kind {
            TrackKind::Video => self.route_video(track),
            TrackKind::Audio => self.route_audio(track, now),
        }
    }

    fn route_video(&mut self, track: RemoteTrack) -> Vec<RoutedTrack> {
        let tagged_screen = is_screen_stream(&track.stream_id);

        // Untagged peers send the screen first; the viewer treats the
        // first video it sees as the shared surface when no tagged
        // screen has shown up yet.
        let is_screen = tagged_screen
            || (self.role == Role::Viewer && !self.screen_classified);

        if is_screen {
            self.screen_classified = true;
            debug!(stream = %track.stream_id, tagged = tagged_screen, "classified screen video");
            return vec![RoutedTrack {
                track,
                classification: TrackClassification::ScreenVideo,
                group: None,
            }];
        }

        self.camera_groups += 1;
        let group = self.camera_groups;
        debug!(stream = %track.stream_id, group, "classified camera video");

        let mut routed = vec![RoutedTrack {
            track,
            classification: TrackClassification::CameraVideo,
            group: Some(group),
        }];

        // A fresh camera group claims any audio still waiting.
        for (audio, _) in self.held_audio.drain(..) {
            routed.push(RoutedTrack {
                track: audio,
                classification: TrackClassification::MicrophoneAudio,
                group: Some(group),
            });
        }
        routed
    }

    fn route_audio(&mut self, track: RemoteTrack, now: Instant) -> Vec<RoutedTrack> {
        // Audio tagged as part of the screen stream is system audio
        // riding alongside the shared surface.
        if is_screen_stream(&track.stream_id) {
            return vec![RoutedTrack {
                track,
                classification: TrackClassification::MicrophoneAudio,
                group: None,
            }];
        }

        if self.camera_groups > 0 {
            return vec![RoutedTrack {
                track,
                classification: TrackClassification::MicrophoneAudio,
                group: Some(self.camera_groups),
            }];
        }

        debug!(stream = %track.stream_id, "holding audio for camera group");
        self.held_audio.push((track, now));
        Vec::new()
    }

    /// Release held audio whose grouping grace has expired. The caller
    /// drives this from its event loop using [`next_flush_deadline`].
    ///
    /// [`next_flush_deadline`]: MediaTrackRouter::next_flush_deadline
    pub fn flush_expired(&mut self, now: Instant) -> Vec<RoutedTrack> {
        let grace = self.grace;
        let mut released = Vec::new();
        self.held_audio.retain(|(track, held_at)| {
            if now.duration_since(*held_at) >= grace {
                released.push(RoutedTrack {
                    track: track.clone(),
                    classification: TrackClassification::Unknown,
                    group: None,
                });
                false
            } else {
                true
            }
        });
        released
    }

    /// When the earliest held audio will expire, if any is held.
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.held_audio
            .iter()
            .map(|(_, held_at)| *held_at + self.grace)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(stream: &str) -> RemoteTrack {
        RemoteTrack {
            stream_id: stream.to_string(),
            label: "video".to_string(),
            kind: TrackKind::Video,
        }
    }

    fn audio(stream: &str) -> RemoteTrack {
        RemoteTrack {
            stream_id: stream.to_string(),
            label: "audio".to_string(),
            kind: TrackKind::Audio,
        }
    }

    #[test]
    fn test_tagged_screen_video() {
        let mut router = MediaTrackRouter::new(Role::Host);
        let routed = router.route(video("screen-ab12"), Instant::now());
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].classification, TrackClassification::ScreenVideo);
        assert_eq!(routed[0].group, None);
    }

    #[test]
    fn test_viewer_assumes_first_untagged_video_is_screen() {
        let mut router = MediaTrackRouter::new(Role::Viewer);
        let now = Instant::now();
        let first = router.route(video("stream-1"), now);
        assert_eq!(first[0].classification, TrackClassification::ScreenVideo);
        let second = router.route(video("stream-2"), now);
        assert_eq!(second[0].classification, TrackClassification::CameraVideo);
        assert_eq!(second[0].group, Some(1));
    }

    #[test]
    fn test_host_untagged_video_is_camera() {
        let mut router = MediaTrackRouter::new(Role::Host);
        let routed = router.route(video("stream-1"), Instant::now());
        assert_eq!(routed[0].classification, TrackClassification::CameraVideo);
    }

    #[test]
    fn test_audio_after_camera_joins_its_group() {
        let mut router = MediaTrackRouter::new(Role::Host);
        let now = Instant::now();
        router.route(video("cam"), now);
        let routed = router.route(audio("cam"), now);
        assert_eq!(routed[0].classification, TrackClassification::MicrophoneAudio);
        assert_eq!(routed[0].group, Some(1));
    }

    #[test]
    fn test_audio_before_camera_is_held_then_claimed() {
        let mut router = MediaTrackRouter::new(Role::Host);
        let now = Instant::now();
        assert!(router.route(audio("cam"), now).is_empty());
        assert!(router.next_flush_deadline().is_some());

        let routed = router.route(video("cam"), now + Duration::from_millis(100));
        assert_eq!(routed.len(), 2);
        assert_eq!(routed[0].classification, TrackClassification::CameraVideo);
        assert_eq!(routed[1].classification, TrackClassification::MicrophoneAudio);
        assert_eq!(routed[1].group, routed[0].group);
        assert!(router.next_flush_deadline().is_none());
    }

    #[test]
    fn test_held_audio_flushes_as_unknown_after_grace() {
        let mut router = MediaTrackRouter::new(Role::Host);
        let now = Instant::now();
        router.route(audio("mic"), now);

        assert!(router.flush_expired(now + Duration::from_millis(100)).is_empty());
        let flushed = router.flush_expired(now + AUDIO_GROUP_GRACE);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].classification, TrackClassification::Unknown);
        assert!(router.next_flush_deadline().is_none());
    }

    #[test]
    fn test_screen_tagged_audio_is_system_audio() {
        let mut router = MediaTrackRouter::new(Role::Viewer);
        let routed = router.route(audio("screen-ab12"), Instant::now());
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].classification, TrackClassification::MicrophoneAudio);
        assert_eq!(routed[0].group, None);
    }
}
