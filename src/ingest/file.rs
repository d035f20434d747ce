//! Local file frame source.
//!
//! `FileSource` dispatches on the path:
//! - `stub://name?frames=N&width=W&height=H&fps=F` synthetic frames
//! - anything else is decoded with FFmpeg (feature: ingest-file-ffmpeg)
//!
//! URLs other than `stub://` are rejected; only local files are decoded.

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::{rgb_len, Frame, StreamInfo};

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    path: String,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::parse(path)?)
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegFileSource::open(path)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "video decoding requires the ingest-file-ffmpeg feature"
                ));
            }
        };
        let source = Self {
            backend,
            path: path.to_string(),
            frames_read: 0,
        };
        let info = source.info();
        log::info!(
            "opened {} ({}x{} @ {:.2} fps)",
            source.path,
            info.width,
            info.height,
            info.fps
        );
        Ok(source)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for FileSource {
    fn info(&self) -> StreamInfo {
        match &self.backend {
            FileBackend::Synthetic(source) => source.info,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.info(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        log::debug!("closing {} after {} frames", self.path, self.frames_read);
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

const SYNTHETIC_DEFAULT_FRAMES: u64 = 30;
const SYNTHETIC_DEFAULT_WIDTH: u32 = 64;
const SYNTHETIC_DEFAULT_HEIGHT: u32 = 48;
const SYNTHETIC_DEFAULT_FPS: f64 = 25.0;
/// Largest synthetic frame, 8K UHD.
const SYNTHETIC_MAX_PIXELS: usize = 7680 * 4320;

/// Deterministic frames. The first pixel's red and green channels carry the
/// frame index (little-endian), so ordering survives the whole pipeline.
struct SyntheticFileSource {
    info: StreamInfo,
    total: u64,
    next_index: u64,
}

impl SyntheticFileSource {
    fn parse(path: &str) -> Result<Self> {
        let rest = path.trim_start_matches("stub://");
        let query = rest.split_once('?').map(|(_, q)| q).unwrap_or("");

        let mut total = SYNTHETIC_DEFAULT_FRAMES;
        let mut width = SYNTHETIC_DEFAULT_WIDTH;
        let mut height = SYNTHETIC_DEFAULT_HEIGHT;
        let mut fps = SYNTHETIC_DEFAULT_FPS;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "frames" => total = value.parse().context("stub frames")?,
                "width" => width = value.parse().context("stub width")?,
                "height" => height = value.parse().context("stub height")?,
                "fps" => fps = value.parse().context("stub fps")?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }

        let pixels = rgb_len(width, height)? / 3;
        if pixels > SYNTHETIC_MAX_PIXELS {
            return Err(anyhow!(
                "stub frame {}x{} exceeds {} pixels",
                width,
                height,
                SYNTHETIC_MAX_PIXELS
            ));
        }

        Ok(Self {
            info: StreamInfo::new(fps, width, height)?,
            total,
            next_index: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.total {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;

        let len = rgb_len(self.info.width, self.info.height)?;
        let pixel_count = len / 3;
        let mut pixels = Vec::with_capacity(len);
        for i in 0..pixel_count {
            pixels.push(((i as u64 + index) % 256) as u8);
            pixels.push(((i as u64 * 3 + index) % 256) as u8);
            pixels.push((i % 256) as u8);
        }
        let [lo, hi, ..] = index.to_le_bytes();
        pixels[0] = lo;
        pixels[1] = hi;

        Ok(Some(Frame::new(
            pixels,
            self.info.width,
            self.info.height,
            index,
        )?))
    }
}

/// Index stamped into the first pixel of a synthetic frame.
pub fn synthetic_frame_tag(frame: &Frame) -> Option<u64> {
    frame
        .pixel(0, 0)
        .map(|[lo, hi, _]| u64::from(lo) | (u64::from(hi) << 8))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
