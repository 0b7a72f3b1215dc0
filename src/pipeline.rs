//! Capture pipelines: one worker feeding one channel
//!
//! The audio and video pipelines are independent; they share nothing but
//! the shutdown signal.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{find_input_name, CpalSource, ToneSource};
use crate::buffer::{create_shared_channel, ChannelStats, SharedChannel};
use crate::capture::{CaptureReport, CaptureSource, CaptureWorker, WorkerHandle, WorkerState, WorkerStatus};
use crate::codec::{Encoder, JpegEncoder, PcmEncoder};
use crate::config::{AppConfig, AudioConfig, SourceKind, VideoConfig};
use crate::error::{CaptureError, Result};
use crate::media::{MediaItem, MediaKind};
use crate::shutdown::ShutdownSignal;
use crate::video::TestPatternSource;

/// How a worker reacts to transient read errors
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_consecutive_failures: u32,
}

/// A running capture worker and the channel it feeds
pub struct Pipeline {
    kind: MediaKind,
    source: String,
    channel: SharedChannel<MediaItem>,
    status: WorkerStatus,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Pipeline {
    /// Create the channel and spawn its worker thread
    pub fn start<S, E>(
        kind: MediaKind,
        capacity: usize,
        source: S,
        encoder: E,
        shutdown: ShutdownSignal,
        retry: RetryPolicy,
    ) -> Result<Self>
    where
        S: CaptureSource,
        E: Encoder<Input = S::Sample>,
    {
        let channel = create_shared_channel(capacity);
        let description = source.describe();

        let worker = CaptureWorker::new(kind, source, encoder, channel.clone(), shutdown)
            .with_retry_delay(retry.delay)
            .with_max_consecutive_failures(retry.max_consecutive_failures);
        let handle = worker.spawn()?;

        Ok(Self {
            kind,
            source: description,
            status: handle.status().clone(),
            channel,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// What the worker captures from, e.g. the selected input
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn channel(&self) -> &SharedChannel<MediaItem> {
        &self.channel
    }

    pub fn state(&self) -> WorkerState {
        self.status.state()
    }

    /// Whether new viewers can be served: the worker has not stopped, or it
    /// left items behind
    pub fn is_available(&self) -> bool {
        self.status.state() != WorkerState::Stopped || !self.channel.is_empty()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            kind: self.kind,
            source: self.source.clone(),
            state: self.status.state(),
            available: self.is_available(),
            capture: self.status.report(),
            channel: self.channel.stats(),
        }
    }

    /// Wait up to `timeout` for the worker to exit
    pub fn join(&self, timeout: Duration) -> Option<std::result::Result<CaptureReport, CaptureError>> {
        let mut worker = self.worker.lock();
        let handle = worker.as_mut()?;
        let outcome = handle.join_timeout(timeout);
        if outcome.is_some() {
            worker.take();
        }
        outcome
    }
}

/// Serializable pipeline snapshot for `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub kind: MediaKind,
    pub source: String,
    pub state: WorkerState,
    pub available: bool,
    pub capture: CaptureReport,
    pub channel: ChannelStats,
}

/// Both pipelines; either may be absent when disabled or unsupported
#[derive(Default, Clone)]
pub struct Pipelines {
    pub audio: Option<Arc<Pipeline>>,
    pub video: Option<Arc<Pipeline>>,
}

impl Pipelines {
    /// Start every enabled pipeline from config
    pub fn start(config: &AppConfig, shutdown: &ShutdownSignal) -> Result<Self> {
        Self::start_with_lookup(config, shutdown, |audio| {
            find_input_name(audio.device.as_deref(), &audio.device_hint)
        })
    }

    /// Like [`Pipelines::start`], resolving the audio input with `lookup`.
    ///
    /// `lookup` returns the name of the input to open, or `None` when no
    /// device matches; audio is then left out and every other pipeline
    /// still starts.
    pub fn start_with_lookup<F>(config: &AppConfig, shutdown: &ShutdownSignal, lookup: F) -> Result<Self>
    where
        F: FnOnce(&AudioConfig) -> Option<String>,
    {
        let audio = if config.audio.enabled {
            start_audio(&config.audio, shutdown.clone(), lookup)?.map(Arc::new)
        } else {
            tracing::warn!("Audio disabled in config; audio streaming will be unavailable");
            None
        };

        let video = if config.video.enabled {
            start_video(&config.video, shutdown.clone())?.map(Arc::new)
        } else {
            tracing::warn!("Video disabled in config; video streaming will be unavailable");
            None
        };

        Ok(Self { audio, video })
    }

    pub fn get(&self, kind: MediaKind) -> Option<&Arc<Pipeline>> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pipeline>> {
        self.audio.iter().chain(self.video.iter())
    }

    /// Join every worker, waiting at most `timeout` for each
    pub fn join_all(&self, timeout: Duration) {
        for pipeline in self.iter() {
            match pipeline.join(timeout) {
                Some(Ok(report)) => tracing::info!(
                    kind = %pipeline.kind(),
                    pushed = report.pushed,
                    transient_errors = report.transient_errors,
                    encode_errors = report.encode_errors,
                    "Capture worker stopped"
                ),
                Some(Err(e)) => {
                    tracing::error!(kind = %pipeline.kind(), "Capture worker failed: {}", e)
                }
                None => tracing::warn!(
                    kind = %pipeline.kind(),
                    "Capture worker did not stop within {:?}; abandoning it",
                    timeout
                ),
            }
        }
    }
}

fn start_audio<F>(config: &AudioConfig, shutdown: ShutdownSignal, lookup: F) -> Result<Option<Pipeline>>
where
    F: FnOnce(&AudioConfig) -> Option<String>,
{
    let encoder = PcmEncoder::new(config.channels);
    let capacity = config.queue_capacity;
    let retry = RetryPolicy::default();

    match config.source {
        SourceKind::Device => {
            let Some(name) = lookup(config) else {
                tracing::warn!(
                    "No audio input matching '{}' and no default input; \
                     audio streaming will be unavailable",
                    config.device.as_deref().unwrap_or(&config.device_hint)
                );
                return Ok(None);
            };
            tracing::info!(device = %name, "Selected audio input");
            Pipeline::start(
                MediaKind::Audio,
                capacity,
                CpalSource::new(config).with_device(name),
                encoder,
                shutdown,
                retry,
            )
            .map(Some)
        }
        SourceKind::Synthetic => Pipeline::start(
            MediaKind::Audio,
            capacity,
            ToneSource::new(config),
            encoder,
            shutdown,
            retry,
        )
        .map(Some),
    }
}

fn start_video(config: &VideoConfig, shutdown: ShutdownSignal) -> Result<Option<Pipeline>> {
    let encoder = JpegEncoder::new(config.jpeg_quality)?;
    let capacity = config.queue_capacity;
    let retry = RetryPolicy {
        delay: Duration::from_millis(config.retry_delay_ms),
        max_consecutive_failures: config.max_consecutive_failures,
    };

    match config.source {
        #[cfg(feature = "camera")]
        SourceKind::Device => Pipeline::start(
            MediaKind::Video,
            capacity,
            crate::video::CameraSource::new(config),
            encoder,
            shutdown,
            retry,
        )
        .map(Some),
        #[cfg(not(feature = "camera"))]
        SourceKind::Device => {
            let _ = (encoder, capacity, retry, shutdown);
            tracing::warn!(
                "Built without the `camera` feature; set video.source = \"synthetic\" \
                 or rebuild with --features camera. Video streaming will be unavailable"
            );
            Ok(None)
        }
        SourceKind::Synthetic => Pipeline::start(
            MediaKind::Video,
            capacity,
            TestPatternSource::new(config),
            encoder,
            shutdown,
            retry,
        )
        .map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownReason;

    fn synthetic_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.source = SourceKind::Synthetic;
        config.audio.chunk_frames = 480;
        config.video.source = SourceKind::Synthetic;
        config.video.width = 64;
        config.video.height = 48;
        config.video.fps = 50;
        config
    }

    #[test]
    fn test_synthetic_pipelines_fill_and_stop() {
        let shutdown = ShutdownSignal::new();
        let pipelines = Pipelines::start(&synthetic_config(), &shutdown).unwrap();

        let video = pipelines.get(MediaKind::Video).unwrap().clone();
        let item = video
            .channel()
            .pop(Duration::from_secs(2))
            .expect("a frame within two seconds");
        assert_eq!(item.kind(), MediaKind::Video);
        assert_eq!(&item.payload()[..2], &[0xFF, 0xD8]);

        let audio = pipelines.get(MediaKind::Audio).unwrap().clone();
        let chunk = audio.channel().pop(Duration::from_secs(2)).unwrap();
        assert_eq!(chunk.len(), 480 * 2);

        shutdown.trigger(ShutdownReason::Requested);
        for pipeline in pipelines.iter() {
            let outcome = pipeline.join(Duration::from_secs(2)).expect("worker stops");
            assert!(outcome.is_ok());
            assert_eq!(pipeline.state(), WorkerState::Stopped);
        }
    }

    #[test]
    fn test_disabled_pipeline_is_absent() {
        let mut config = synthetic_config();
        config.audio.enabled = false;
        let shutdown = ShutdownSignal::new();

        let pipelines = Pipelines::start(&config, &shutdown).unwrap();
        assert!(pipelines.audio.is_none());
        assert!(pipelines.video.is_some());

        shutdown.trigger(ShutdownReason::Requested);
        pipelines.join_all(Duration::from_secs(2));
    }

    #[test]
    fn test_missing_audio_input_leaves_video_running() {
        let mut config = synthetic_config();
        config.audio.source = SourceKind::Device;
        let shutdown = ShutdownSignal::new();

        let pipelines = Pipelines::start_with_lookup(&config, &shutdown, |_| None).unwrap();
        assert!(pipelines.audio.is_none());

        let video = pipelines.get(MediaKind::Video).unwrap().clone();
        assert!(video.channel().pop(Duration::from_secs(2)).is_some());
        assert!(!shutdown.is_triggered());
        assert_eq!(video.state(), WorkerState::Running);

        shutdown.trigger(ShutdownReason::Requested);
        pipelines.join_all(Duration::from_secs(2));
    }

    #[test]
    fn test_lookup_sees_configured_device() {
        let mut config = synthetic_config();
        config.audio.source = SourceKind::Device;
        config.audio.device = Some("Line In".to_string());
        config.video.enabled = false;
        let shutdown = ShutdownSignal::new();

        let mut asked = None;
        let pipelines = Pipelines::start_with_lookup(&config, &shutdown, |audio| {
            asked = audio.device.clone();
            None
        })
        .unwrap();

        assert_eq!(asked.as_deref(), Some("Line In"));
        assert!(pipelines.iter().next().is_none());
    }
}
