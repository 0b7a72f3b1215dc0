//! # LAN A/V Streamer
//!
//! Live, best-effort audio and video streaming from local capture hardware
//! to any number of HTTP viewers on the LAN.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               STREAMER HOST                               │
//! │                                                                          │
//! │   ┌─────────────┐                              ┌─────────────┐           │
//! │   │ Microphone  │                              │   Webcam    │           │
//! │   └──────┬──────┘                              └──────┬──────┘           │
//! │          │ read                                       │ read             │
//! │          ▼                                            ▼                  │
//! │   ┌─────────────┐                              ┌─────────────┐           │
//! │   │  Capture    │  PCM s16le                   │  Capture    │  JPEG     │
//! │   │  Worker     │  (capture::CaptureWorker)    │  Worker     │           │
//! │   └──────┬──────┘                              └──────┬──────┘           │
//! │          │ push (drop oldest)                         │ push             │
//! │          ▼                                            ▼                  │
//! │   ┌─────────────┐                              ┌─────────────┐           │
//! │   │ Bounded     │  K = 10                      │ Bounded     │  K = 2    │
//! │   │ Channel     │  (buffer::BoundedChannel)    │ Channel     │           │
//! │   └──────┬──────┘                              └──────┬──────┘           │
//! │          │ pop(1s), competing consumers               │                  │
//! │     ┌────┴────┐                                  ┌────┴────┐             │
//! │     ▼         ▼                                  ▼         ▼             │
//! │  Session   Session   (session::StreamSession)  Session   Session         │
//! │     │         │                                  │         │             │
//! │  ┌──┴─────────┴──────────────────────────────────┴─────────┴──┐          │
//! │  │              HTTP dispatcher (ui::server, axum)             │          │
//! │  │   /audio.stream  raw PCM      /video.stream  MJPEG          │          │
//! │  └─────────────────────────────────────────────────────────────┘          │
//! │                                                                          │
//! │   shutdown::ShutdownSignal is shared by every loop above                 │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod buffer;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod session;
pub mod shutdown;
pub mod ui;
pub mod video;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio capture
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Frames per captured audio chunk
    pub const DEFAULT_CHUNK_FRAMES: usize = 2048;

    /// Audio channel capacity, sized for continuity
    pub const DEFAULT_AUDIO_CAPACITY: usize = 10;

    /// Video channel capacity, sized for freshness
    pub const DEFAULT_VIDEO_CAPACITY: usize = 2;

    /// Default camera index
    pub const DEFAULT_VIDEO_DEVICE: u32 = 0;

    /// Default video geometry and rate
    pub const DEFAULT_FRAME_WIDTH: u32 = 640;
    pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
    pub const DEFAULT_FRAME_RATE: u32 = 24;

    /// JPEG quality (1-100)
    pub const DEFAULT_JPEG_QUALITY: u8 = 75;

    /// Substring used to pick an audio input when none is configured
    pub const DEFAULT_AUDIO_DEVICE_HINT: &str = "USB";

    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 5000;

    /// How long a session waits on an empty channel before re-checking shutdown
    pub const SESSION_POLL_TIMEOUT_MS: u64 = 1000;

    /// Multipart boundary token for the MJPEG stream
    pub const MJPEG_BOUNDARY: &str = "frame";
}
