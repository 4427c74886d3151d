use tracing::{debug, info};

use crate::config::ImageConfig;
use crate::error::CaptureError;
use crate::types::{FrameSize, JpegQuality};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Camera hardware driver boundary. Returns one JPEG-encoded frame.
pub trait CameraSensor {
    async fn grab_frame(
        &mut self,
        frame_size: FrameSize,
        quality: JpegQuality,
    ) -> Result<Vec<u8>, CaptureError>;
}

/// Single-shot capture. Retrying is the caller's decision.
pub struct ImageCapture<C> {
    sensor: C,
}

impl<C: CameraSensor> ImageCapture<C> {
    pub fn new(sensor: C) -> Self {
        Self { sensor }
    }

    pub async fn capture(&mut self, config: &ImageConfig) -> Result<Vec<u8>, CaptureError> {
        let (width, height) = config.frame_size.dimensions();
        debug!(width, height, quality = config.quality.value(), "Triggering capture");

        let frame = self.sensor.grab_frame(config.frame_size, config.quality).await?;
        if frame.is_empty() {
            return Err(CaptureError::EncodeFailure("sensor returned an empty frame".into()));
        }
        if !frame.starts_with(&JPEG_SOI) {
            return Err(CaptureError::EncodeFailure("frame is not JPEG encoded".into()));
        }

        info!(bytes = frame.len(), width, height, "Captured frame");
        Ok(frame)
    }
}
