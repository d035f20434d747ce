//! annotate - run object detection over a video or image and write an
//! annotated copy.
//!
//! Settings come from `ANNOTATOR_CONFIG` and `ANNOTATOR_*` environment
//! variables; command line flags override both.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use video_annotator::{AnnotatorConfig, Annotator, BackendRegistry, CompressionOutcome};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video (mp4, avi, mov, mkv), image (jpg, jpeg, png) or stub:// clip
    input: String,

    /// Output path (MP4 for videos, same format as the input for images)
    output: PathBuf,

    /// Minimum confidence for a detection to be kept
    #[arg(long, value_name = "0..1")]
    confidence: Option<f32>,

    /// IoU above which overlapping detections are suppressed
    #[arg(long, value_name = "0..1")]
    iou: Option<f32>,

    /// Frames per inference call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Detector backend, in preference order (repeatable)
    #[arg(long = "backend", value_name = "NAME")]
    backends: Vec<String>,

    /// ONNX model for the tract backend
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Write per-frame detections as JSON
    #[arg(long, value_name = "PATH")]
    detections_json: Option<PathBuf>,

    /// List compiled-in detector backends and exit
    #[arg(long)]
    list_backends: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let registry = BackendRegistry::with_builtin();

    if args.list_backends {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = {
        let stage = ui.stage("Load configuration");
        let mut config = AnnotatorConfig::load().context("load annotator configuration")?;
        apply_args(&mut config, &args);
        config.validate().context("invalid command line settings")?;
        stage.complete(None);
        config
    };

    let backend = {
        let stage = ui.stage("Load detector");
        let backend = registry.create(&config.detector.backends, &config.detector)?;
        stage.complete(Some(backend.name().to_string()));
        backend
    };

    let mut annotator = Annotator::new(config, backend)
        .map_err(|err| anyhow!("{} error: {}", err.stage(), err))?
        .with_report(args.detections_json.is_some());

    let summary = {
        let stage = ui.stage("Annotate");
        let summary = annotator
            .run(&args.input, &args.output)
            .map_err(|err| anyhow!("{} stage failed: {}", err.stage(), err))?;
        stage.complete(Some(format!(
            "{} frames, {} detections",
            summary.frames_written, summary.detections
        )));
        summary
    };

    if let (Some(path), Some(report)) = (&args.detections_json, &summary.report) {
        let stage = ui.stage("Write detections");
        report.write_json(path)?;
        stage.complete(Some(path.display().to_string()));
    }

    println!("annotate: {} -> {}", args.input, args.output.display());
    println!("  frames:       {}", summary.frames_written);
    println!("  batches:      {} ({} padded slots)", summary.batches, summary.padded_slots);
    println!("  detections:   {}", summary.detections);
    println!("  inference:    {:.2} ms/frame", summary.avg_infer_ms);
    match summary.compression {
        Some(CompressionOutcome::Compressed { before, after }) => {
            println!("  compressed:   {} -> {} bytes", before, after);
        }
        Some(CompressionOutcome::WithinLimit { size }) => {
            println!("  size:         {} bytes", size);
        }
        None => {}
    }
    Ok(())
}

fn apply_args(config: &mut AnnotatorConfig, args: &Args) {
    if let Some(confidence) = args.confidence {
        config.detector.confidence_threshold = confidence;
    }
    if let Some(iou) = args.iou {
        config.detector.iou_threshold = iou;
    }
    if let Some(batch_size) = args.batch_size {
        config.detector.batch_size = batch_size;
    }
    if !args.backends.is_empty() {
        config.detector.backends = args.backends.clone();
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
}
