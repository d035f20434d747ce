//! Output size guard.
//!
//! Annotated videos above the distribution limit are re-encoded at a fixed
//! bitrate. The re-encode goes to a temporary file in the output directory
//! and replaces the output with a rename, so a failed compression never
//! damages the original.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

use crate::error::{PipelineError, PipelineResult};

/// Even dimensions are required by yuv420p encoders.
pub const EVEN_SCALE_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";

/// Re-encodes `input` into `output` at `bitrate`.
pub trait Compressor {
    fn compress(&self, input: &Path, output: &Path, bitrate: &str) -> Result<()>;
}

/// Compressor backed by the `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegCompressor {
    ffmpeg_path: String,
}

impl FfmpegCompressor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn args(input: &Path, output: &Path, bitrate: &str) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-b:v".into(),
            bitrate.to_string(),
            "-bufsize".into(),
            bitrate.to_string(),
            "-vf".into(),
            EVEN_SCALE_FILTER.into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegCompressor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Compressor for FfmpegCompressor {
    fn compress(&self, input: &Path, output: &Path, bitrate: &str) -> Result<()> {
        let result = Command::new(&self.ffmpeg_path)
            .args(Self::args(input, output, bitrate))
            .output()
            .with_context(|| format!("failed to run {}", self.ffmpeg_path))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("ffmpeg exited with {}: {}", result.status, stderr.trim()));
        }
        Ok(())
    }
}

/// What `SizeGuard::enforce` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// Output was already within the limit.
    WithinLimit { size: u64 },
    /// Output was re-encoded and replaced.
    Compressed { before: u64, after: u64 },
}

impl CompressionOutcome {
    pub fn final_size(&self) -> u64 {
        match *self {
            Self::WithinLimit { size } => size,
            Self::Compressed { after, .. } => after,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SizeGuard {
    limit: u64,
    bitrate: String,
}

impl SizeGuard {
    pub fn new(limit: u64, bitrate: impl Into<String>) -> Self {
        Self {
            limit,
            bitrate: bitrate.into(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Compress `path` in place when it exceeds the limit.
    pub fn enforce(
        &self,
        path: &Path,
        compressor: &dyn Compressor,
    ) -> PipelineResult<CompressionOutcome> {
        let before = std::fs::metadata(path)?.len();
        if before <= self.limit {
            return Ok(CompressionOutcome::WithinLimit { size: before });
        }
        log::info!(
            "{} is {} bytes (limit {}), re-encoding at {}",
            path.display(),
            before,
            self.limit,
            self.bitrate
        );

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| ".mp4".to_string());
        let temp = tempfile::Builder::new()
            .prefix(".compress-")
            .suffix(&suffix)
            .tempfile_in(dir)?;

        // Dropping `temp` on any error below removes it.
        compressor
            .compress(path, temp.path(), &self.bitrate)
            .map_err(|err| PipelineError::compression(path, &err))?;
        let after = std::fs::metadata(temp.path())?.len();
        if after == 0 {
            return Err(PipelineError::compression(
                path,
                &anyhow!("compressor produced an empty file"),
            ));
        }
        temp.persist(path)
            .map_err(|err| PipelineError::compression(path, &anyhow::Error::new(err.error)))?;

        if after > self.limit {
            log::warn!(
                "{} is still {} bytes after compression (limit {})",
                path.display(),
                after,
                self.limit
            );
        } else {
            log::info!("compressed {} from {} to {} bytes", path.display(), before, after);
        }
        Ok(CompressionOutcome::Compressed { before, after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Shrink {
        bytes: usize,
        calls: Cell<u32>,
    }

    impl Compressor for Shrink {
        fn compress(&self, input: &Path, output: &Path, bitrate: &str) -> Result<()> {
            assert!(input.exists());
            assert_eq!(bitrate, "1M");
            self.calls.set(self.calls.get() + 1);
            std::fs::write(output, vec![7u8; self.bytes])?;
            Ok(())
        }
    }

    struct Broken;

    impl Compressor for Broken {
        fn compress(&self, _input: &Path, output: &Path, _bitrate: &str) -> Result<()> {
            std::fs::write(output, b"half")?;
            Err(anyhow!("encoder crashed"))
        }
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".compress-"))
            .count()
    }

    #[test]
    fn small_outputs_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![0u8; 100]).unwrap();
        let shrink = Shrink { bytes: 10, calls: Cell::new(0) };

        let outcome = SizeGuard::new(100, "1M").enforce(&out, &shrink).unwrap();
        assert_eq!(outcome, CompressionOutcome::WithinLimit { size: 100 });
        assert_eq!(shrink.calls.get(), 0);
    }

    #[test]
    fn oversized_output_is_replaced_by_compressed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![0u8; 120]).unwrap();
        let shrink = Shrink { bytes: 40, calls: Cell::new(0) };

        let outcome = SizeGuard::new(100, "1M").enforce(&out, &shrink).unwrap();
        assert_eq!(outcome, CompressionOutcome::Compressed { before: 120, after: 40 });
        assert!(outcome.final_size() <= 100);
        assert_eq!(std::fs::read(&out).unwrap(), vec![7u8; 40]);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn failed_compression_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![1u8; 120]).unwrap();

        let err = SizeGuard::new(100, "1M").enforce(&out, &Broken).unwrap_err();
        assert!(matches!(err, PipelineError::Compression { .. }));
        assert!(err.to_string().contains("encoder crashed"));
        assert_eq!(std::fs::read(&out).unwrap(), vec![1u8; 120]);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn still_oversized_result_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        std::fs::write(&out, vec![0u8; 120]).unwrap();
        let shrink = Shrink { bytes: 110, calls: Cell::new(0) };

        let outcome = SizeGuard::new(100, "1M").enforce(&out, &shrink).unwrap();
        assert_eq!(outcome.final_size(), 110);
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 110);
    }

    #[test]
    fn ffmpeg_arguments_match_bitrate_and_even_scale() {
        let args = FfmpegCompressor::args(Path::new("in.mp4"), Path::new("out.mp4"), "1M");
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mp4"));
        assert!(joined.contains("-b:v 1M -bufsize 1M"));
        assert!(joined.contains("-vf scale=trunc(iw/2)*2:trunc(ih/2)*2"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }
}
