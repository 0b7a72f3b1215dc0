//! JPEG encoder for MJPEG video frames

use bytes::Bytes;
use image::{ImageBuffer, Rgb};

use crate::codec::Encoder;
use crate::error::CodecError;
use crate::video::VideoFrame;

/// RGB8 frame → baseline JPEG
pub struct JpegEncoder {
    quality: u8,
    frames_encoded: u64,
}

impl JpegEncoder {
    /// Create an encoder; `quality` must be in 1..=100
    pub fn new(quality: u8) -> Result<Self, CodecError> {
        if !(1..=100).contains(&quality) {
            return Err(CodecError::EncoderInit(format!(
                "JPEG quality must be 1-100, got {}",
                quality
            )));
        }
        Ok(Self {
            quality,
            frames_encoded: 0,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }
}

impl Encoder for JpegEncoder {
    type Input = VideoFrame;

    fn encode(&mut self, frame: &VideoFrame) -> Result<Bytes, CodecError> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            return Err(CodecError::InvalidFrameSize {
                expected,
                actual: frame.pixels.len(),
            });
        }

        // from_raw only fails on a length mismatch, checked above
        let image: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.as_slice()).ok_or(
                CodecError::InvalidFrameSize {
                    expected,
                    actual: frame.pixels.len(),
                },
            )?;

        let mut jpeg_bytes: Vec<u8> = Vec::with_capacity(expected / 8);
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_bytes, self.quality);
        encoder
            .encode_image(&image)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        Ok(Bytes::from(jpeg_bytes))
    }
}
