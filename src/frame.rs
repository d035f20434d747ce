//! Decoded frames and stream metadata.
//!
//! - `Frame`: RGB24 pixel buffer tagged with its position in the source stream.
//! - `StreamInfo`: frame rate and resolution, read once when a source opens.
//! - `MediaKind`: which pipeline an input path belongs to, by extension.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::Path;

/// Video container extensions accepted as input.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Still image extensions accepted as input.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Stream metadata exposed by every frame source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl StreamInfo {
    pub fn new(fps: f64, width: u32, height: u32) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(anyhow!("frame rate must be positive, got {}", fps));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("frame size must be positive, got {}x{}", width, height));
        }
        Ok(Self { fps, width, height })
    }
}

/// One decoded frame in RGB24 layout.
///
/// Frames move through the pipeline by value. The only clone happens when a
/// short final batch is padded with copies of its last frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Zero-based position in the source stream.
    pub index: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    pub fn from_image(image: RgbImage, index: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            index,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 3;
        match self.data.get(offset..offset + 3)? {
            &[r, g, b] => Some([r, g, b]),
            _ => None,
        }
    }

    /// Borrow the frame as an image, run `f`, and store the result back.
    ///
    /// Does nothing when `width`/`height` no longer match the pixel buffer.
    pub fn edit_image<F: FnOnce(&mut RgbImage)>(&mut self, f: F) {
        if rgb_len(self.width, self.height).ok() != Some(self.data.len()) {
            return;
        }
        let data = std::mem::take(&mut self.data);
        let mut image = match RgbImage::from_raw(self.width, self.height, data) {
            Some(image) => image,
            None => return,
        };
        f(&mut image);
        self.data = image.into_raw();
    }
}

/// Kind of media an input path refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
    /// `stub://` synthetic video.
    Synthetic,
}

impl MediaKind {
    pub fn from_path(path: &str) -> Option<Self> {
        if path.starts_with("stub://") {
            return Some(Self::Synthetic);
        }
        let ext = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())?;
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_length() {
        assert!(Frame::new(vec![0u8; 11], 2, 2, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 0).is_ok());
    }

    #[test]
    fn edit_image_round_trips_pixels() -> Result<()> {
        let mut frame = Frame::new(vec![0u8; 12], 2, 2, 7)?;
        frame.edit_image(|image| image.put_pixel(1, 1, image::Rgb([9, 8, 7])));
        assert_eq!(frame.pixel(1, 1), Some([9, 8, 7]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.index, 7);
        Ok(())
    }

    #[test]
    fn edit_image_keeps_pixels_when_size_is_stale() -> Result<()> {
        let mut frame = Frame::new(vec![5u8; 12], 2, 2, 0)?;
        frame.width = 3;
        let mut called = false;
        frame.edit_image(|_| called = true);
        assert!(!called);
        assert_eq!(frame.pixels(), &[5u8; 12][..]);
        Ok(())
    }

    #[test]
    fn media_kind_by_extension() {
        assert_eq!(MediaKind::from_path("a/b/clip.MP4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path("clip.mkv"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path("photo.jpeg"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path("stub://demo"), Some(MediaKind::Synthetic));
        assert_eq!(MediaKind::from_path("notes.txt"), None);
        assert_eq!(MediaKind::from_path("noext"), None);
    }

    #[test]
    fn stream_info_rejects_zero_rate() {
        assert!(StreamInfo::new(0.0, 640, 480).is_err());
        assert!(StreamInfo::new(25.0, 0, 480).is_err());
        assert!(StreamInfo::new(29.97, 640, 480).is_ok());
    }
}
