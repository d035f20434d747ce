//! Still image source: a one-frame stream.

use anyhow::{Context, Result};
use std::path::Path;

use super::FrameSource;
use crate::frame::{Frame, StreamInfo};

/// Nominal rate reported for still images.
const IMAGE_FPS: f64 = 1.0;

pub struct ImageSource {
    info: StreamInfo,
    frame: Option<Frame>,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        let info = StreamInfo::new(IMAGE_FPS, image.width(), image.height())?;
        Ok(Self {
            info,
            frame: Some(Frame::from_image(image, 0)),
        })
    }
}

impl FrameSource for ImageSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }
}
