//! Sample encoders
//!
//! Turns raw samples pulled from a capture handle into the payload bytes a
//! stream session forwards to clients.

pub mod jpeg;
pub mod pcm;

pub use jpeg::JpegEncoder;
pub use pcm::PcmEncoder;

use bytes::Bytes;

use crate::error::CodecError;

/// Encodes one raw sample into an opaque payload
pub trait Encoder: Send + 'static {
    /// Raw sample type produced by the matching capture handle
    type Input;

    fn encode(&mut self, input: &Self::Input) -> Result<Bytes, CodecError>;
}
