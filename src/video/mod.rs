//! Video subsystem module

#[cfg(feature = "camera")]
pub mod camera;
pub mod pattern;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use pattern::TestPatternSource;

/// One decoded RGB8 frame, row-major, 3 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }
}
