use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::InputSpec;

const DEFAULT_CONFIDENCE: f32 = 0.32;
const DEFAULT_IOU: f32 = 0.5;
const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_BACKENDS: &[&str] = &["tract", "stub"];
const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_COMPRESS_ABOVE_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_TARGET_BITRATE: &str = "1M";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_VIDEO_CODEC: &str = "mpeg4";

#[derive(Debug, Deserialize, Default)]
struct AnnotatorConfigFile {
    detector: Option<DetectorConfigFile>,
    limits: Option<LimitsConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    batch_size: Option<usize>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    backends: Option<Vec<String>>,
    model_path: Option<PathBuf>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct LimitsConfigFile {
    max_input_bytes: Option<u64>,
    compress_above_bytes: Option<u64>,
    compress: Option<bool>,
    target_bitrate: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    ffmpeg_path: Option<String>,
    video_codec: Option<String>,
}

/// Full configuration for an annotation run.
#[derive(Debug, Clone, Default)]
pub struct AnnotatorConfig {
    pub detector: DetectorSettings,
    pub limits: LimitSettings,
    pub output: OutputSettings,
}

/// Detector, batching and postprocessing settings.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub batch_size: usize,
    pub input_width: u32,
    pub input_height: u32,
    /// Backend names in preference order.
    pub backends: Vec<String>,
    pub model_path: Option<PathBuf>,
    /// Label text per class id. Ids without a name are labelled numerically.
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LimitSettings {
    pub max_input_bytes: u64,
    /// Re-encode outputs larger than this. `None` disables compression.
    pub compress_above_bytes: Option<u64>,
    pub target_bitrate: String,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub ffmpeg_path: String,
    pub video_codec: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            batch_size: DEFAULT_BATCH_SIZE,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            backends: DEFAULT_BACKENDS.iter().map(|b| b.to_string()).collect(),
            model_path: None,
            class_names: Vec::new(),
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            compress_above_bytes: Some(DEFAULT_COMPRESS_ABOVE_BYTES),
            target_bitrate: DEFAULT_TARGET_BITRATE.to_string(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: DEFAULT_FFMPEG.to_string(),
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
        }
    }
}

impl DetectorSettings {
    pub fn input_spec(&self) -> InputSpec {
        InputSpec::new(self.input_width, self.input_height)
    }

    /// Label text for a class id.
    pub fn class_label(&self, class_id: u32) -> String {
        self.class_names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!("IoU threshold must be within [0, 1]"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch size must be >= 1"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        if self.backends.is_empty() {
            return Err(anyhow!("at least one detector backend must be listed"));
        }
        Ok(())
    }
}

impl AnnotatorConfig {
    /// Load defaults, then `ANNOTATOR_CONFIG` (TOML or JSON), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANNOTATOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnnotatorConfigFile) -> Self {
        let defaults = Self::default();
        let detector = match file.detector {
            Some(d) => DetectorSettings {
                confidence_threshold: d
                    .confidence_threshold
                    .unwrap_or(defaults.detector.confidence_threshold),
                iou_threshold: d.iou_threshold.unwrap_or(defaults.detector.iou_threshold),
                batch_size: d.batch_size.unwrap_or(defaults.detector.batch_size),
                input_width: d.input_width.unwrap_or(defaults.detector.input_width),
                input_height: d.input_height.unwrap_or(defaults.detector.input_height),
                backends: d.backends.unwrap_or(defaults.detector.backends),
                model_path: d.model_path,
                class_names: d.class_names.unwrap_or_default(),
            },
            None => defaults.detector,
        };
        let limits = match file.limits {
            Some(l) => LimitSettings {
                max_input_bytes: l.max_input_bytes.unwrap_or(defaults.limits.max_input_bytes),
                compress_above_bytes: if l.compress == Some(false) {
                    None
                } else {
                    l.compress_above_bytes.or(defaults.limits.compress_above_bytes)
                },
                target_bitrate: l
                    .target_bitrate
                    .unwrap_or(defaults.limits.target_bitrate),
            },
            None => defaults.limits,
        };
        let output = match file.output {
            Some(o) => OutputSettings {
                ffmpeg_path: o.ffmpeg_path.unwrap_or(defaults.output.ffmpeg_path),
                video_codec: o.video_codec.unwrap_or(defaults.output.video_codec),
            },
            None => defaults.output,
        };
        Self {
            detector,
            limits,
            output,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("ANNOTATOR_CONFIDENCE") {
            self.detector.confidence_threshold = value
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_CONFIDENCE must be a number"))?;
        }
        if let Some(value) = env_value("ANNOTATOR_IOU") {
            self.detector.iou_threshold = value
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_IOU must be a number"))?;
        }
        if let Some(value) = env_value("ANNOTATOR_BATCH_SIZE") {
            self.detector.batch_size = value
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_BATCH_SIZE must be a positive integer"))?;
        }
        if let Some(value) = env_value("ANNOTATOR_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value("ANNOTATOR_BACKENDS") {
            let parsed = split_csv(&value);
            if !parsed.is_empty() {
                self.detector.backends = parsed;
            }
        }
        if let Some(value) = env_value("ANNOTATOR_MAX_INPUT_BYTES") {
            self.limits.max_input_bytes = value
                .parse()
                .map_err(|_| anyhow!("ANNOTATOR_MAX_INPUT_BYTES must be an integer byte count"))?;
        }
        if let Some(value) = env_value("ANNOTATOR_COMPRESS_ABOVE_BYTES") {
            self.limits.compress_above_bytes = match value.as_str() {
                "off" | "none" | "0" => None,
                _ => Some(value.parse().map_err(|_| {
                    anyhow!("ANNOTATOR_COMPRESS_ABOVE_BYTES must be an integer byte count or 'off'")
                })?),
            };
        }
        if let Some(value) = env_value("ANNOTATOR_TARGET_BITRATE") {
            self.limits.target_bitrate = value;
        }
        if let Some(value) = env_value("ANNOTATOR_FFMPEG") {
            self.output.ffmpeg_path = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if self.limits.max_input_bytes == 0 {
            return Err(anyhow!("max input size must be greater than zero"));
        }
        if self.limits.target_bitrate.trim().is_empty() {
            return Err(anyhow!("target bitrate must not be empty"));
        }
        if self.output.ffmpeg_path.trim().is_empty() {
            return Err(anyhow!("ffmpeg path must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AnnotatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_detector_conventions() {
        let cfg = AnnotatorConfig::default();
        assert_eq!(cfg.detector.confidence_threshold, 0.32);
        assert_eq!(cfg.detector.iou_threshold, 0.5);
        assert_eq!(cfg.detector.batch_size, 16);
        assert_eq!(cfg.detector.input_spec(), InputSpec::new(640, 640));
        assert_eq!(cfg.limits.max_input_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.limits.target_bitrate, "1M");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn class_label_falls_back_to_id() {
        let settings = DetectorSettings {
            class_names: vec!["person".into(), "car".into()],
            ..DetectorSettings::default()
        };
        assert_eq!(settings.class_label(1), "car");
        assert_eq!(settings.class_label(7), "7");
    }

    #[test]
    fn validation_rejects_bad_thresholds() {
        let mut settings = DetectorSettings::default();
        settings.confidence_threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = DetectorSettings::default();
        settings.batch_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn compress_flag_disables_size_guard() {
        let file: AnnotatorConfigFile = toml::from_str(
            r#"
            [limits]
            compress = false
            compress_above_bytes = 10
            "#,
        )
        .unwrap();
        let cfg = AnnotatorConfig::from_file(file);
        assert_eq!(cfg.limits.compress_above_bytes, None);
    }
}
