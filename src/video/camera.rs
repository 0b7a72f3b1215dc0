//! Webcam capture using nokhwa

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};

use crate::capture::{CaptureHandle, CaptureSource};
use crate::config::VideoConfig;
use crate::error::CaptureError;
use crate::video::VideoFrame;

pub struct CameraSource {
    index: u32,
    width: u32,
    height: u32,
    fps: u32,
}

impl CameraSource {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            index: config.device_index,
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

impl CaptureSource for CameraSource {
    type Sample = VideoFrame;
    type Handle = CameraHandle;

    fn describe(&self) -> String {
        format!("camera {}", self.index)
    }

    fn open(&mut self) -> Result<CameraHandle, CaptureError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(self.width, self.height),
                FrameFormat::MJPEG,
                self.fps,
            ),
        ));

        let init_error = |e: NokhwaError| {
            CaptureError::device_init(
                self.describe(),
                format!(
                    "{} (ensure the webcam is connected and not in use; \
                     `v4l2-ctl --list-devices` lists cameras)",
                    e
                ),
            )
        };

        let mut camera = Camera::new(CameraIndex::Index(self.index), requested).map_err(init_error)?;
        camera.open_stream().map_err(init_error)?;

        let format = camera.camera_format();
        tracing::info!(
            "Video capture started: {}x{} @ {} FPS (requested {}x{} @ {} FPS)",
            format.width(),
            format.height(),
            format.frame_rate(),
            self.width,
            self.height,
            self.fps
        );

        Ok(CameraHandle {
            camera,
            streaming: true,
        })
    }
}

pub struct CameraHandle {
    camera: Camera,
    streaming: bool,
}

impl CaptureHandle for CameraHandle {
    type Sample = VideoFrame;

    fn read(&mut self) -> Result<VideoFrame, CaptureError> {
        let buffer = self.camera.frame().map_err(|e| match e {
            NokhwaError::ReadFrameError(msg) => {
                CaptureError::TransientRead(format!("Failed to grab frame from camera: {}", msg))
            }
            other => CaptureError::UnrecoverableRead(other.to_string()),
        })?;

        // A frame that fails to decode is corrupt, not a dead device
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::TransientRead(format!("Failed to decode frame: {}", e)))?;

        Ok(VideoFrame::new(image.width(), image.height(), image.into_raw()))
    }

    fn close(&mut self) {
        if self.streaming {
            self.streaming = false;
            if let Err(e) = self.camera.stop_stream() {
                tracing::warn!("Error closing camera stream: {}", e);
            }
        }
    }
}
