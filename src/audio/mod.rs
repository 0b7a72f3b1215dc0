//! Audio subsystem module

pub mod capture;
pub mod device;
pub mod tone;

pub use capture::{CpalHandle, CpalSource};
pub use device::{find_input_name, list_input_devices, AudioDeviceInfo};
pub use tone::ToneSource;

/// One block of interleaved f32 samples as read from an input
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Get number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Get block duration in microseconds
    pub fn duration_us(&self) -> u64 {
        (self.frames() as u64 * 1_000_000) / self.sample_rate.max(1) as u64
    }
}
