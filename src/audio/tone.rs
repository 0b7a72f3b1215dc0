//! Synthetic sine-tone source, paced like a real input

use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::AudioBlock;
use crate::capture::{CaptureHandle, CaptureSource};
use crate::config::AudioConfig;
use crate::error::CaptureError;

pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    realtime: bool,
}

impl ToneSource {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            frequency: config.tone_frequency,
            amplitude: 0.25,
            sample_rate: config.sample_rate,
            channels: config.channels,
            chunk_frames: config.chunk_frames,
            realtime: true,
        }
    }

    /// Produce chunks as fast as they are read instead of in real time
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

impl CaptureSource for ToneSource {
    type Sample = AudioBlock;
    type Handle = ToneHandle;

    fn describe(&self) -> String {
        format!("{} Hz test tone", self.frequency)
    }

    fn open(&mut self) -> Result<ToneHandle, CaptureError> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(CaptureError::device_init(
                self.describe(),
                "sample rate and channel count must be non-zero",
            ));
        }
        Ok(ToneHandle {
            phase: 0.0,
            step: TAU * self.frequency / self.sample_rate as f32,
            amplitude: self.amplitude,
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunk_frames: self.chunk_frames,
            chunk_duration: Duration::from_secs_f64(
                self.chunk_frames as f64 / self.sample_rate as f64,
            ),
            next_deadline: self.realtime.then(Instant::now),
        })
    }
}

pub struct ToneHandle {
    phase: f32,
    step: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    chunk_duration: Duration,
    next_deadline: Option<Instant>,
}

impl CaptureHandle for ToneHandle {
    type Sample = AudioBlock;

    fn read(&mut self) -> Result<AudioBlock, CaptureError> {
        if let Some(deadline) = self.next_deadline.as_mut() {
            *deadline += self.chunk_duration;
            let now = Instant::now();
            if *deadline > now {
                thread::sleep(*deadline - now);
            }
        }

        let mut samples = Vec::with_capacity(self.chunk_frames * self.channels as usize);
        for _ in 0..self.chunk_frames {
            let value = self.phase.sin() * self.amplitude;
            for _ in 0..self.channels {
                samples.push(value);
            }
            self.phase = (self.phase + self.step) % TAU;
        }

        Ok(AudioBlock::new(samples, self.channels, self.sample_rate))
    }
}
