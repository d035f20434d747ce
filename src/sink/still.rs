use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSink;
use crate::frame::Frame;

/// Writes a single annotated frame as an image. Format follows the extension.
pub struct ImageSink {
    output: PathBuf,
    written: bool,
}

impl ImageSink {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            written: false,
        }
    }
}

impl FrameSink for ImageSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            return Err(anyhow!("image output {} takes one frame", self.output.display()));
        }
        image::save_buffer(
            &self.output,
            frame.pixels(),
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .with_context(|| format!("save {}", self.output.display()))?;
        self.written = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.written {
            return Err(anyhow!("no frame was written to {}", self.output.display()));
        }
        log::info!("wrote {}", self.output.display());
        Ok(())
    }
}
