//! End-to-end annotation.
//!
//! `Annotator` pulls frames from a `FrameSource`, converts them to tensors,
//! groups them into fixed-size batches, runs the detector backend, then
//! filters, rescales, suppresses and renders detections before handing each
//! real frame to a `FrameSink`. Everything runs on the calling thread, in
//! source order. Source and sink are owned for the duration of a call and
//! dropped before it returns, whether it succeeds or not.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::batch::{Batch, BatchAccumulator};
use crate::compress::{CompressionOutcome, Compressor, FfmpegCompressor, SizeGuard};
use crate::config::AnnotatorConfig;
use crate::detect::{DetectorBackend, FrameResult, InputSpec};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::MediaKind;
use crate::ingest::{FileSource, FrameSource, ImageSource};
use crate::postprocess::Postprocessor;
use crate::preprocess::to_tensor;
use crate::render::{RenderStyle, Renderer};
use crate::report::DetectionReport;
use crate::sink::{FfmpegSink, FrameSink, ImageSink};

/// Outcome of one annotation run.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    /// Real frames handed to the sink.
    pub frames_written: u64,
    /// Backend calls.
    pub batches: u64,
    /// Padding slots sent to the backend and discarded.
    pub padded_slots: u64,
    pub detections: u64,
    /// Mean backend time per real frame.
    pub avg_infer_ms: f64,
    pub compression: Option<CompressionOutcome>,
    /// Present when the annotator collects reports.
    pub report: Option<DetectionReport>,
}

pub struct Annotator {
    config: AnnotatorConfig,
    backend: Box<dyn DetectorBackend>,
    input: InputSpec,
    postprocessor: Postprocessor,
    renderer: Renderer,
    compressor: Box<dyn Compressor>,
    collect_report: bool,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig, backend: Box<dyn DetectorBackend>) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|err| PipelineError::Config(format!("{err:#}")))?;
        let input = backend.input_spec();
        if input.width == 0 || input.height == 0 {
            return Err(PipelineError::Config(format!(
                "backend {} reports an empty input size",
                backend.name()
            )));
        }
        let postprocessor = Postprocessor::new(
            config.detector.confidence_threshold,
            config.detector.iou_threshold,
            input,
        );
        let renderer = Renderer::new(RenderStyle::default(), config.detector.class_names.clone());
        let compressor = Box::new(FfmpegCompressor::new(config.output.ffmpeg_path.clone()));
        log::info!(
            "annotator ready: backend={} input={}x{} batch={} conf={} iou={}",
            backend.name(),
            input.width,
            input.height,
            config.detector.batch_size,
            config.detector.confidence_threshold,
            config.detector.iou_threshold
        );
        Ok(Self {
            config,
            backend,
            input,
            postprocessor,
            renderer,
            compressor,
            collect_report: false,
        })
    }

    /// Collect a per-frame detection report into `StreamSummary::report`.
    pub fn with_report(mut self, enabled: bool) -> Self {
        self.collect_report = enabled;
        self
    }

    pub fn with_render_style(mut self, style: RenderStyle) -> Self {
        self.renderer = Renderer::new(style, self.config.detector.class_names.clone());
        self
    }

    /// Replace the compressor used by the size guard.
    pub fn with_compressor(mut self, compressor: Box<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Annotate an input path, choosing the video or image pipeline by
    /// extension. `stub://` inputs take the video pipeline.
    pub fn run(&mut self, input: &str, output: &Path) -> PipelineResult<StreamSummary> {
        match MediaKind::from_path(input) {
            Some(MediaKind::Image) => self.run_on_image(Path::new(input), output),
            Some(MediaKind::Video) | Some(MediaKind::Synthetic) => self.run_on_video(input, output),
            None => Err(PipelineError::UnsupportedFormat(input.to_string())),
        }
    }

    /// Annotate a video file into an MP4, then enforce the output size limit.
    pub fn run_on_video(&mut self, input: &str, output: &Path) -> PipelineResult<StreamSummary> {
        let kind = MediaKind::from_path(input);
        if !matches!(kind, Some(MediaKind::Video) | Some(MediaKind::Synthetic)) {
            return Err(PipelineError::UnsupportedFormat(input.to_string()));
        }
        if kind == Some(MediaKind::Video) {
            self.check_input_size(Path::new(input))?;
        }

        let source = FileSource::open(input).map_err(|err| PipelineError::open(input, &err))?;
        let sink = FfmpegSink::new(
            output,
            source.info(),
            self.config.output.ffmpeg_path.clone(),
            self.config.output.video_codec.clone(),
        );
        self.annotate_to_file(source, sink, output)
    }

    /// Run `annotate_stream` into a sink that writes `output`, then apply
    /// the size guard to that file.
    pub fn annotate_to_file<S, K>(
        &mut self,
        source: S,
        sink: K,
        output: &Path,
    ) -> PipelineResult<StreamSummary>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let mut summary = self.annotate_stream(source, sink)?;

        if let Some(limit) = self.config.limits.compress_above_bytes {
            let guard = SizeGuard::new(limit, self.config.limits.target_bitrate.clone());
            summary.compression = Some(guard.enforce(output, self.compressor.as_ref())?);
        }
        Ok(summary)
    }

    /// Annotate a still image as a one-frame stream.
    pub fn run_on_image(&mut self, input: &Path, output: &Path) -> PipelineResult<StreamSummary> {
        let display = input.display().to_string();
        if MediaKind::from_path(&display) != Some(MediaKind::Image) {
            return Err(PipelineError::UnsupportedFormat(display));
        }
        self.check_input_size(input)?;
        let source = ImageSource::open(input).map_err(|err| PipelineError::open(&display, &err))?;
        self.annotate_stream(source, ImageSink::new(output))
    }

    /// Core loop over any source and sink.
    pub fn annotate_stream<S, K>(&mut self, mut source: S, mut sink: K) -> PipelineResult<StreamSummary>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let mut accumulator = BatchAccumulator::new(self.config.detector.batch_size);
        let mut summary = StreamSummary {
            report: self.collect_report.then(DetectionReport::default),
            ..StreamSummary::default()
        };
        let mut infer_time = Duration::ZERO;

        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(PipelineError::decode(&err)),
            };
            let tensor = to_tensor(&frame, &self.input);
            if let Some(batch) = accumulator.push(tensor, frame) {
                infer_time += self.process_batch(batch, &mut sink, &mut summary)?;
            }
        }
        if let Some(batch) = accumulator.flush() {
            infer_time += self.process_batch(batch, &mut sink, &mut summary)?;
        }
        drop(source);

        if summary.frames_written == 0 {
            return Err(PipelineError::EmptyStream(
                "no frames were decoded".to_string(),
            ));
        }
        sink.finish().map_err(|err| PipelineError::encode(&err))?;

        summary.avg_infer_ms = infer_time.as_secs_f64() * 1000.0 / summary.frames_written as f64;
        log::info!(
            "annotated {} frames in {} batches of {} ({} padded slots), {} detections, avg inference {:.2} ms/frame",
            summary.frames_written,
            summary.batches,
            accumulator.batch_size(),
            summary.padded_slots,
            summary.detections,
            summary.avg_infer_ms
        );
        Ok(summary)
    }

    fn process_batch<K: FrameSink>(
        &mut self,
        batch: Batch,
        sink: &mut K,
        summary: &mut StreamSummary,
    ) -> PipelineResult<Duration> {
        let started = Instant::now();
        let outputs = self
            .backend
            .infer(&batch)
            .map_err(|err| PipelineError::inference(format!("{err:#}")))?;
        let elapsed = started.elapsed();
        if outputs.len() != batch.len() {
            return Err(PipelineError::inference(format!(
                "backend {} returned {} results for a batch of {}",
                self.backend.name(),
                outputs.len(),
                batch.len()
            )));
        }
        summary.batches += 1;
        summary.padded_slots += batch.pad() as u64;
        log::debug!(
            "batch {}: {} frames + {} padding in {:?}",
            summary.batches,
            batch.valid_len(),
            batch.pad(),
            elapsed
        );

        for (mut frame, raw) in batch.into_valid_frames().into_iter().zip(outputs) {
            let detections = self.postprocessor.process(&raw, frame.width, frame.height);
            if !detections.is_empty() {
                self.renderer.render(&mut frame, &detections);
            }
            sink.write_frame(&frame)
                .map_err(|err| PipelineError::encode(&err))?;
            summary.frames_written += 1;
            summary.detections += detections.len() as u64;

            if let Some(report) = summary.report.as_mut() {
                let result = FrameResult {
                    frame_index: frame.index,
                    detections,
                };
                report.push(&result, |id| self.config.detector.class_label(id));
            }
        }
        Ok(elapsed)
    }

    fn check_input_size(&self, path: &Path) -> PipelineResult<()> {
        let display = path.display().to_string();
        let metadata = std::fs::metadata(path)
            .map_err(|err| PipelineError::open(&display, &anyhow::Error::new(err)))?;
        let limit = self.config.limits.max_input_bytes;
        if metadata.len() > limit {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{RawDetection, StubBackend};
    use crate::frame::{Frame, StreamInfo};
    use anyhow::Result;

    struct VecSink {
        frames: Vec<Frame>,
        finished: bool,
    }

    impl FrameSink for &mut VecSink {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn config(batch_size: usize) -> AnnotatorConfig {
        let mut cfg = AnnotatorConfig::default();
        cfg.detector.batch_size = batch_size;
        cfg
    }

    fn stub(input: InputSpec) -> Box<dyn DetectorBackend> {
        Box::new(StubBackend::new(input))
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = config(4);
        cfg.detector.iou_threshold = -0.1;
        let err = Annotator::new(cfg, stub(InputSpec::new(8, 8))).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let mut annotator = Annotator::new(config(4), stub(InputSpec::new(8, 8))).unwrap();
        let err = annotator.run("notes.txt", Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        let err = annotator
            .run_on_video("photo.png", Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn report_lists_every_real_frame() {
        let input = InputSpec::new(16, 16);
        let backend = StubBackend::new(input)
            .with_detections(vec![RawDetection::new(2.0, 2.0, 8.0, 8.0, 0.9, 0)]);
        let mut cfg = config(4);
        cfg.detector.class_names = vec!["person".into()];
        let mut annotator = Annotator::new(cfg, Box::new(backend)).unwrap().with_report(true);

        let source = FileSource::open("stub://r?frames=6&width=32&height=32").unwrap();
        let mut sink = VecSink { frames: Vec::new(), finished: false };
        let summary = annotator.annotate_stream(source, &mut sink).unwrap();

        assert!(sink.finished);
        assert_eq!(summary.frames_written, 6);
        assert_eq!(summary.padded_slots, 2);
        let report = summary.report.unwrap();
        let frames: Vec<u64> = report.frames.iter().map(|f| f.frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(report.frames[0].detections[0].class, "person");
        // 2..8 in a 16px model space maps to 4..16 in a 32px frame.
        assert_eq!(report.frames[0].detections[0].bbox, [4, 4, 12, 12]);
    }

    #[test]
    fn decode_failure_maps_to_decode_error() {
        struct Failing(u64);
        impl FrameSource for Failing {
            fn info(&self) -> StreamInfo {
                StreamInfo::new(25.0, 4, 4).unwrap()
            }
            fn next_frame(&mut self) -> Result<Option<Frame>> {
                if self.0 == 2 {
                    anyhow::bail!("corrupt packet");
                }
                self.0 += 1;
                Ok(Some(Frame::new(vec![0; 48], 4, 4, self.0 - 1)?))
            }
        }

        let mut annotator = Annotator::new(config(8), stub(InputSpec::new(8, 8))).unwrap();
        let mut sink = VecSink { frames: Vec::new(), finished: false };
        let err = annotator.annotate_stream(Failing(0), &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(!sink.finished);
    }

    /// Writes a fixed number of bytes per frame into `path` on finish.
    struct BytesSink {
        path: std::path::PathBuf,
        per_frame: usize,
        frames: usize,
    }

    impl FrameSink for BytesSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.frames += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            std::fs::write(&self.path, vec![0u8; self.per_frame * self.frames])?;
            Ok(())
        }
    }

    struct ShrinkTo(usize);

    impl Compressor for ShrinkTo {
        fn compress(&self, _input: &Path, output: &Path, _bitrate: &str) -> Result<()> {
            std::fs::write(output, vec![1u8; self.0])?;
            Ok(())
        }
    }

    struct CrashingCompressor;

    impl Compressor for CrashingCompressor {
        fn compress(&self, _input: &Path, _output: &Path, _bitrate: &str) -> Result<()> {
            anyhow::bail!("encoder crashed")
        }
    }

    fn size_limited(limit: u64, compressor: Box<dyn Compressor>) -> Annotator {
        let mut cfg = config(4);
        cfg.limits.compress_above_bytes = Some(limit);
        Annotator::new(cfg, stub(InputSpec::new(8, 8)))
            .unwrap()
            .with_compressor(compressor)
    }

    #[test]
    fn oversized_video_output_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let sink = BytesSink { path: output.clone(), per_frame: 20, frames: 0 };
        let source = FileSource::open("stub://c?frames=6&width=8&height=8").unwrap();

        let summary = size_limited(100, Box::new(ShrinkTo(40)))
            .annotate_to_file(source, sink, &output)
            .unwrap();

        assert_eq!(summary.frames_written, 6);
        assert_eq!(
            summary.compression,
            Some(CompressionOutcome::Compressed { before: 120, after: 40 })
        );
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 40);
    }

    #[test]
    fn compression_failure_keeps_annotated_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let sink = BytesSink { path: output.clone(), per_frame: 20, frames: 0 };
        let source = FileSource::open("stub://c?frames=6&width=8&height=8").unwrap();

        let err = size_limited(100, Box::new(CrashingCompressor))
            .annotate_to_file(source, sink, &output)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Compression { .. }));
        assert_eq!(err.stage(), "compression");
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 120);
    }

    #[test]
    fn small_video_output_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let sink = BytesSink { path: output.clone(), per_frame: 10, frames: 0 };
        let source = FileSource::open("stub://c?frames=6&width=8&height=8").unwrap();

        let summary = size_limited(100, Box::new(CrashingCompressor))
            .annotate_to_file(source, sink, &output)
            .unwrap();

        assert_eq!(summary.compression, Some(CompressionOutcome::WithinLimit { size: 60 }));
    }
}
