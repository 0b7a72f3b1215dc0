//! Error types for the streaming application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture subsystem errors
///
/// Only [`CaptureError::DeviceInit`] and [`CaptureError::UnrecoverableRead`]
/// are fatal; a worker keeps running through transient read errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Failed to open {device}: {reason}")]
    DeviceInit { device: String, reason: String },

    #[error("Transient read error: {0}")]
    TransientRead(String),

    #[error("Unrecoverable read error: {0}")]
    UnrecoverableRead(String),
}

impl CaptureError {
    pub fn device_init(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceInit {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must stop the worker and the whole process
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TransientRead(_))
    }
}

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },
}

/// The client side of a stream went away; ends a session, never an error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Client disconnected")]
pub struct ClientDisconnected;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CaptureError::device_init("hw:1,0", "busy").is_fatal());
        assert!(CaptureError::UnrecoverableRead("gone".into()).is_fatal());
        assert!(!CaptureError::TransientRead("overflow".into()).is_fatal());
    }

    #[test]
    fn test_conversion_into_app_error() {
        let err: Error = CaptureError::TransientRead("overflow".into()).into();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(err.to_string(), "Capture error: Transient read error: overflow");
    }
}
