//! Audio capture from input devices
//!
//! cpal delivers input through a callback on its own thread. The callback
//! forwards each block over a bounded crossbeam channel; [`CpalHandle::read`]
//! pulls from that channel so the capture worker sees a blocking read.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::device::{find_input_device, get_device_capabilities};
use crate::audio::AudioBlock;
use crate::capture::{CaptureHandle, CaptureSource};
use crate::config::AudioConfig;
use crate::error::CaptureError;

/// Callback blocks buffered between cpal and the worker
const BRIDGE_CAPACITY: usize = 64;

/// Microphone / line input through the default cpal host
pub struct CpalSource {
    preferred: Option<String>,
    hint: String,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    read_timeout: Duration,
}

impl CpalSource {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            preferred: config.device.clone(),
            hint: config.device_hint.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            chunk_frames: config.chunk_frames,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }

    /// Open exactly this input instead of matching the hint
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.preferred = Some(name.into());
        self
    }

    fn build_error(&self, device: &cpal::Device, name: &str, err: cpal::BuildStreamError) -> CaptureError {
        match err {
            cpal::BuildStreamError::StreamConfigNotSupported => {
                let (rates, channels) = get_device_capabilities(device);
                CaptureError::device_init(
                    name,
                    format!(
                        "{} Hz / {} channel(s) is not supported; device supports rates {:?} \
                         and channel counts {:?} (adjust audio.sample_rate / audio.channels)",
                        self.sample_rate, self.channels, rates, channels
                    ),
                )
            }
            other => CaptureError::device_init(name, other.to_string()),
        }
    }
}

impl CaptureSource for CpalSource {
    type Sample = AudioBlock;
    type Handle = CpalHandle;

    fn describe(&self) -> String {
        match &self.preferred {
            Some(name) => format!("audio input '{}'", name),
            None => format!("audio input matching '{}'", self.hint),
        }
    }

    fn open(&mut self) -> Result<CpalHandle, CaptureError> {
        let (device, name) = find_input_device(self.preferred.as_deref(), &self.hint)?;
        tracing::info!(device = %name, "Attempting to open audio stream...");

        let config = StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sample_tx, sample_rx) = bounded::<Vec<f32>>(BRIDGE_CAPACITY);
        let (error_tx, error_rx) = bounded::<cpal::StreamError>(16);
        let overflowed = Arc::new(AtomicBool::new(false));
        let overflow_flag = overflowed.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if sample_tx.try_send(data.to_vec()).is_err() {
                        overflow_flag.store(true, Ordering::Relaxed);
                    }
                },
                move |err| {
                    let _ = error_tx.try_send(err);
                },
                None,
            )
            .map_err(|e| self.build_error(&device, &name, e))?;

        // On failure the stream is dropped here, which releases the device
        stream
            .play()
            .map_err(|e| CaptureError::device_init(&name, e.to_string()))?;

        tracing::info!(
            device = %name,
            "Audio stream opened: {}ch, {}Hz, {} frames/chunk",
            self.channels,
            self.sample_rate,
            self.chunk_frames
        );

        Ok(CpalHandle {
            device: name,
            stream: Some(stream),
            sample_rx,
            error_rx,
            overflowed,
            pending: Vec::new(),
            chunk_len: self.chunk_frames * self.channels as usize,
            channels: self.channels,
            sample_rate: self.sample_rate,
            read_timeout: self.read_timeout,
        })
    }
}

/// An open cpal input stream
pub struct CpalHandle {
    device: String,
    stream: Option<cpal::Stream>,
    sample_rx: Receiver<Vec<f32>>,
    error_rx: Receiver<cpal::StreamError>,
    overflowed: Arc<AtomicBool>,
    pending: Vec<f32>,
    chunk_len: usize,
    channels: u16,
    sample_rate: u32,
    read_timeout: Duration,
}

impl CpalHandle {
    /// Error reported by the cpal error callback, if any
    fn take_fault(&self) -> Option<CaptureError> {
        match self.error_rx.try_recv() {
            Ok(err) => Some(classify_stream_error(err)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

fn classify_stream_error(err: cpal::StreamError) -> CaptureError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            CaptureError::UnrecoverableRead("audio device is no longer available".to_string())
        }
        other => CaptureError::TransientRead(other.to_string()),
    }
}

impl CaptureHandle for CpalHandle {
    type Sample = AudioBlock;

    fn read(&mut self) -> Result<AudioBlock, CaptureError> {
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        if self.overflowed.swap(false, Ordering::Relaxed) {
            // Blocks were lost; drop the partial chunk so output stays aligned
            self.pending.clear();
            return Err(CaptureError::TransientRead("Audio input overflowed".to_string()));
        }

        while self.pending.len() < self.chunk_len {
            match self.sample_rx.recv_timeout(self.read_timeout) {
                Ok(data) => self.pending.extend_from_slice(&data),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.take_fault().unwrap_or_else(|| {
                        CaptureError::TransientRead(format!(
                            "no audio from '{}' within {:?}",
                            self.device, self.read_timeout
                        ))
                    }));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::UnrecoverableRead(format!(
                        "audio stream for '{}' closed",
                        self.device
                    )));
                }
            }
        }

        let rest = self.pending.split_off(self.chunk_len);
        let samples = std::mem::replace(&mut self.pending, rest);
        Ok(AudioBlock::new(samples, self.channels, self.sample_rate))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::warn!(device = %self.device, "Error pausing audio stream: {}", e);
            }
            drop(stream);
            tracing::info!(device = %self.device, "Audio stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_classification() {
        assert!(classify_stream_error(cpal::StreamError::DeviceNotAvailable).is_fatal());
        let backend = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".to_string(),
            },
        };
        assert!(!classify_stream_error(backend).is_fatal());
    }

    #[test]
    #[ignore = "requires an audio input device"]
    fn test_capture_from_default_input() {
        let config = AudioConfig {
            device_hint: String::new(),
            ..AudioConfig::default()
        };
        let mut source = CpalSource::new(&config);
        let mut handle = source.open().expect("open default input");

        let block = handle.read().expect("read one chunk");
        assert_eq!(block.frames(), config.chunk_frames);
        handle.close();
    }
}
