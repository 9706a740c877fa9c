//! Sample-fed local tracks for the WebRTC backend.
//!
//! Capture hardware stays out of scope here; callers push encoded
//! samples into an [`RtcLocalTrack`] themselves, or let the synthetic
//! [`SyntheticMediaSource`] drive placeholder frames for loopback runs
//! and demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::trace;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use glance_core::error::Result;
use glance_core::media::{
    CameraConfig, LocalTrack, MediaSource, ScreenConfig, TrackKind, SCREEN_STREAM_PREFIX,
};

/// A local track backed by a sample-writable WebRTC track.
pub struct RtcLocalTrack {
    inner: Arc<TrackLocalStaticSample>,
    kind: TrackKind,
    label: String,
    stream_id: String,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    feeder: Mutex<Option<JoinHandle<()>>>,
}

impl RtcLocalTrack {
    pub fn new(kind: TrackKind, label: &str, stream_id: &str) -> Arc<Self> {
        let capability = match kind {
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_string(),
                ..Default::default()
            },
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                ..Default::default()
            },
        };
        let inner = Arc::new(TrackLocalStaticSample::new(
            capability,
            label.to_string(),
            stream_id.to_string(),
        ));
        Arc::new(RtcLocalTrack {
            inner,
            kind,
            label: label.to_string(),
            stream_id: stream_id.to_string(),
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
            feeder: Mutex::new(None),
        })
    }

    /// The underlying sample track, for attaching to a peer connection.
    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.clone()
    }

    /// Push one encoded sample. Dropped silently while the track is
    /// muted or stopped.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_enabled() || self.is_stopped() {
            return Ok(());
        }
        self.inner
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(glance_core::error::EngineError::transport)
    }

    /// Feed placeholder samples at `fps` until the track is stopped.
    /// Write failures are expected while the track is unbound and are
    /// ignored.
    fn start_synthetic_feeder(self: &Arc<Self>, fps: u32) {
        let track = self.clone();
        let interval = feeder_interval(fps);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Minimal placeholder payload; real encoders replace this.
            let payload = Bytes::from_static(&[0u8; 16]);
            loop {
                ticker.tick().await;
                if track.is_stopped() {
                    break;
                }
                if !track.is_enabled() {
                    continue;
                }
                if let Err(e) = track.inner
                    .write_sample(&Sample {
                        data: payload.clone(),
                        duration: interval,
                        ..Default::default()
                    })
                    .await
                {
                    trace!(error = %e, "sample write skipped");
                }
            }
        });
        *self.feeder.lock().unwrap() = Some(handle);
    }
}

impl LocalTrack for RtcLocalTrack {
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
        if let Some(feeder) = self.feeder.lock().unwrap().take() {
            feeder.abort();
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Tick period for a synthetic feeder. Never zero: `tokio::time::interval`
/// panics on a zero period, and very high rates floor at 1 ms.
fn feeder_interval(fps: u32) -> Duration {
    Duration::from_millis((1000 / u64::from(fps.max(1))).max(1))
}

fn random_stream_suffix() -> String {
    let mut rng = rand::thread_rng();
    format!("{:08x}", rng.gen::<u32>())
}

/// Media source producing synthetic sample-fed tracks.
#[derive(Default)]
pub struct SyntheticMediaSource;

impl SyntheticMediaSource {
    pub fn new() -> Self {
        SyntheticMediaSource
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire_screen(&self, config: &ScreenConfig) -> Result<Vec<Arc<dyn LocalTrack>>> {
        let stream = format!("{SCREEN_STREAM_PREFIX}{}", random_stream_suffix());
        let video = RtcLocalTrack::new(TrackKind::Video, "screen", &stream);
        video.start_synthetic_feeder(30);
        let mut tracks: Vec<Arc<dyn LocalTrack>> = vec![video];
        if config.capture_system_audio {
            let audio = RtcLocalTrack::new(TrackKind::Audio, "system-audio", &stream);
            audio.start_synthetic_feeder(50);
            tracks.push(audio);
        }
        Ok(tracks)
    }

    async fn acquire_user_media(
        &self,
        camera: Option<&CameraConfig>,
        microphone: bool,
    ) -> Result<Vec<Arc<dyn LocalTrack>>> {
        let stream = format!("user-{}", random_stream_suffix());
        let mut tracks: Vec<Arc<dyn LocalTrack>> = Vec::new();
        if let Some(camera) = camera {
            let video = RtcLocalTrack::new(TrackKind::Video, "camera", &stream);
            video.start_synthetic_feeder(camera.fps);
            tracks.push(video);
        }
        if microphone {
            let audio = RtcLocalTrack::new(TrackKind::Audio, "microphone", &stream);
            audio.start_synthetic_feeder(50);
            tracks.push(audio);
        }
        Ok(tracks)
    }
}
