//! Video Annotator
//!
//! Batched object detection over video files.
//!
//! # Architecture
//!
//! Frames move strictly left to right through single-threaded stages:
//!
//! 1. **Frame Source**: decode RGB frames from a file, image or `stub://` clip.
//! 2. **Preprocess**: resize to the model input and lay out as CHW `f32`.
//! 3. **Batch**: group into fixed-size batches, padding the last one.
//! 4. **Detect**: run a backend chosen from the registry.
//! 5. **Postprocess**: confidence filter, rescale, non-max suppression.
//! 6. **Render + Sink**: draw overlays and encode real frames only.
//! 7. **Size Guard**: re-encode outputs above the distribution limit.
//!
//! # Module Structure
//!
//! - `frame`: Frames, stream metadata, accepted media kinds
//! - `ingest`: Frame sources (FFmpeg files, still images, synthetic)
//! - `detect`: Backend trait, registry and detection types
//! - `pipeline`: `Annotator`, the orchestration loop
//! - `sink`, `compress`: Output encoding and size enforcement

pub mod batch;
pub mod compress;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod render;
pub mod report;
pub mod sink;

pub use batch::{Batch, BatchAccumulator};
pub use compress::{CompressionOutcome, Compressor, FfmpegCompressor, SizeGuard};
pub use config::{AnnotatorConfig, DetectorSettings, LimitSettings, OutputSettings};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectorBackend, FrameResult, InputSpec,
    RawDetection, StubBackend,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, MediaKind, StreamInfo};
pub use ingest::{FileSource, FrameSource, ImageSource};
pub use pipeline::{Annotator, StreamSummary};
pub use postprocess::Postprocessor;
pub use render::{RenderStyle, Renderer};
pub use report::DetectionReport;
pub use sink::{FfmpegSink, FrameSink, ImageSink};
