//! Application configuration
//!
//! Loaded once at startup from TOML; every value is injected into the
//! component that needs it and never changes at runtime.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Where samples for a pipeline come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Real capture hardware
    Device,
    /// Generated signal (sine tone / colour bars)
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub source: SourceKind,
    /// Exact device name (or `input:` id); overrides `device_hint`
    pub device: Option<String>,
    /// Substring matched against input names when `device` is unset
    pub device_hint: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_frames: usize,
    pub queue_capacity: usize,
    /// Upper bound on one blocking read from the device
    pub read_timeout_ms: u64,
    /// Frequency of the synthetic tone
    pub tone_frequency: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: SourceKind::Device,
            device: None,
            device_hint: DEFAULT_AUDIO_DEVICE_HINT.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            queue_capacity: DEFAULT_AUDIO_CAPACITY,
            read_timeout_ms: 1000,
            tone_frequency: 440.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    pub source: SourceKind,
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
    pub queue_capacity: usize,
    /// Pause after a failed frame grab
    pub retry_delay_ms: u64,
    /// Failed grabs in a row that count as a lost camera (0 = never)
    pub max_consecutive_failures: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: SourceKind::Device,
            device_index: DEFAULT_VIDEO_DEVICE,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            fps: DEFAULT_FRAME_RATE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            queue_capacity: DEFAULT_VIDEO_CAPACITY,
            retry_delay_ms: 100,
            max_consecutive_failures: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Session wait on an empty channel before re-checking shutdown
    pub session_poll_timeout_ms: u64,
    /// Time given to capture workers to fail before serving starts
    pub startup_grace_ms: u64,
    /// Bound on joining each capture worker at exit
    pub worker_join_timeout_ms: u64,
    /// How often the server checks for shutdown
    pub shutdown_poll_ms: u64,
    /// Time open connections get to finish once shutdown starts
    pub drain_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            session_poll_timeout_ms: SESSION_POLL_TIMEOUT_MS,
            startup_grace_ms: 1000,
            worker_join_timeout_ms: 2000,
            shutdown_poll_ms: 100,
            drain_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Default config file location (`~/.config/lan-av-streamer/config.toml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-av-streamer").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.queue_capacity == 0 || self.video.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if audio.sample_rate == 0 || audio.channels == 0 || audio.chunk_frames == 0 {
            return Err(Error::Config(
                "audio sample_rate, channels and chunk_frames must be non-zero".into(),
            ));
        }

        let video = &self.video;
        if !(1..=100).contains(&video.jpeg_quality) {
            return Err(Error::Config(format!(
                "video.jpeg_quality must be 1-100, got {}",
                video.jpeg_quality
            )));
        }
        if video.width == 0 || video.height == 0 || video.fps == 0 {
            return Err(Error::Config("video width, height and fps must be non-zero".into()));
        }

        if self.server.session_poll_timeout_ms == 0 {
            return Err(Error::Config("server.session_poll_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}
