//! Frame sources.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Still images (one-frame streams)
//! - `stub://` synthetic video (tests and dry runs)
//!
//! Every source yields RGB frames in presentation order and reports end of
//! stream with `Ok(None)`. Decoder handles are owned by the source and
//! released when it is dropped, whichever way the run ends.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod still;

use anyhow::Result;

use crate::frame::{Frame, StreamInfo};

pub use file::FileSource;
pub use still::ImageSource;

/// Lazy, finite, non-restartable sequence of decoded frames.
pub trait FrameSource {
    /// Stream metadata, fixed at open time.
    fn info(&self) -> StreamInfo;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}
