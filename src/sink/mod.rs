//! Annotated frame sinks.
//!
//! - `FfmpegSink`: MP4 output through an `ffmpeg` child process
//! - `ImageSink`: one still image through the `image` crate

pub mod ffmpeg;
pub mod still;

use anyhow::Result;

use crate::frame::Frame;

pub use ffmpeg::FfmpegSink;
pub use still::ImageSink;

/// Ordered consumer of annotated frames.
///
/// `finish` completes the output. A sink dropped without `finish` must not
/// leave a file that looks complete.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

impl<K: FrameSink + ?Sized> FrameSink for Box<K> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
