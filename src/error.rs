//! Error types for the annotation pipeline.
//!
//! Components below the pipeline boundary report failures with `anyhow`.
//! `Annotator` maps each failure to the variant naming the stage it came from.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort an annotation run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open source {path}: {message}")]
    Open { path: String, message: String },

    #[error("failed to decode source frame: {0}")]
    Decode(String),

    #[error("input {path} is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to encode output: {0}")]
    Encode(String),

    #[error("source {0} produced no frames")]
    EmptyStream(String),

    #[error("compression of {path} failed: {message}")]
    Compression { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn open(path: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Open {
            path: path.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn decode(err: &anyhow::Error) -> Self {
        Self::Decode(format!("{err:#}"))
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn encode(err: &anyhow::Error) -> Self {
        Self::Encode(format!("{err:#}"))
    }

    pub fn compression(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self::Compression {
            path: path.into(),
            message: format!("{err:#}"),
        }
    }

    /// Short name of the stage that failed, for logs and exit messages.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Open { .. } | Self::FileTooLarge { .. } | Self::UnsupportedFormat(_) => "source",
            Self::Decode(_) | Self::EmptyStream(_) => "decode",
            Self::Inference(_) => "inference",
            Self::Encode(_) => "encode",
            Self::Compression { .. } => "compression",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn open_error_keeps_context_chain() {
        let err = anyhow!("no such file").context("probe container");
        let mapped = PipelineError::open("clip.mp4", &err);
        let text = mapped.to_string();
        assert!(text.contains("clip.mp4"));
        assert!(text.contains("probe container"));
        assert!(text.contains("no such file"));
        assert_eq!(mapped.stage(), "source");
    }

    #[test]
    fn compression_error_names_output_path() {
        let err = anyhow!("ffmpeg exited with status 1");
        let mapped = PipelineError::compression("out.mp4", &err);
        assert_eq!(mapped.stage(), "compression");
        assert!(mapped.to_string().contains("out.mp4"));
    }
}
