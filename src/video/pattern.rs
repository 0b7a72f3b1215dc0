//! Moving colour-bar source for running without a camera

use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{CaptureHandle, CaptureSource};
use crate::config::VideoConfig;
use crate::error::CaptureError;
use crate::video::VideoFrame;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps: u32,
    realtime: bool,
}

impl TestPatternSource {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            realtime: true,
        }
    }

    /// Produce frames as fast as they are read
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

impl CaptureSource for TestPatternSource {
    type Sample = VideoFrame;
    type Handle = TestPatternHandle;

    fn describe(&self) -> String {
        format!("test pattern {}x{} @ {} fps", self.width, self.height, self.fps)
    }

    fn open(&mut self) -> Result<TestPatternHandle, CaptureError> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(CaptureError::device_init(
                self.describe(),
                "width, height and fps must be non-zero",
            ));
        }
        Ok(TestPatternHandle {
            width: self.width,
            height: self.height,
            frame_interval: Duration::from_secs(1) / self.fps,
            next_deadline: self.realtime.then(Instant::now),
            offset: 0,
        })
    }
}

pub struct TestPatternHandle {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_deadline: Option<Instant>,
    offset: u32,
}

impl CaptureHandle for TestPatternHandle {
    type Sample = VideoFrame;

    fn read(&mut self) -> Result<VideoFrame, CaptureError> {
        if let Some(deadline) = self.next_deadline.as_mut() {
            *deadline += self.frame_interval;
            let now = Instant::now();
            if *deadline > now {
                thread::sleep(*deadline - now);
            }
        }

        let bar_width = (self.width / BARS.len() as u32).max(1);
        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for _ in 0..self.height {
            for x in 0..self.width {
                let bar = (((x + self.offset) / bar_width) as usize) % BARS.len();
                pixels.extend_from_slice(&BARS[bar]);
            }
        }
        self.offset = (self.offset + 4) % self.width;

        Ok(VideoFrame::new(self.width, self.height, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_geometry_and_motion() {
        let config = VideoConfig {
            width: 32,
            height: 4,
            ..VideoConfig::default()
        };
        let mut source = TestPatternSource::new(&config).unpaced();
        let mut handle = source.open().unwrap();

        let first = handle.read().unwrap();
        let second = handle.read().unwrap();
        assert_eq!(first.pixels.len(), 32 * 4 * 3);
        assert_ne!(first.pixels, second.pixels);
    }

    #[test]
    fn test_zero_fps_fails_to_open() {
        let config = VideoConfig {
            fps: 0,
            ..VideoConfig::default()
        };
        assert!(matches!(
            TestPatternSource::new(&config).open(),
            Err(CaptureError::DeviceInit { .. })
        ));
    }
}
