//! Raw PCM encoder
//!
//! Converts captured f32 blocks to interleaved signed 16-bit little-endian
//! bytes, the format advertised on the status page (`aplay -f S16_LE`).

use bytes::{BufMut, Bytes, BytesMut};

use crate::audio::AudioBlock;
use crate::codec::Encoder;
use crate::error::CodecError;

/// f32 → s16le encoder
pub struct PcmEncoder {
    channels: u16,
    /// Frame counter for statistics
    blocks_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(channels: u16) -> Self {
        Self {
            channels,
            blocks_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            blocks_encoded: self.blocks_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Clamp and scale one sample to i16
fn to_i16(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round();
    scaled as i16
}

impl Encoder for PcmEncoder {
    type Input = AudioBlock;

    fn encode(&mut self, block: &AudioBlock) -> Result<Bytes, CodecError> {
        if block.channels != self.channels {
            return Err(CodecError::EncodingFailed(format!(
                "expected {} channel(s), block has {}",
                self.channels, block.channels
            )));
        }
        if block.samples.len() % self.channels as usize != 0 {
            return Err(CodecError::InvalidFrameSize {
                expected: block.frames() * self.channels as usize,
                actual: block.samples.len(),
            });
        }

        let mut out = BytesMut::with_capacity(block.samples.len() * 2);
        for &sample in &block.samples {
            out.put_i16_le(to_i16(sample));
        }

        self.blocks_encoded += 1;
        self.bytes_produced += out.len() as u64;

        Ok(out.freeze())
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub blocks_encoded: u64,
    pub bytes_produced: u64,
}
