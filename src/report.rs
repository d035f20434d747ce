//! Per-frame detection report.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detect::{Detection, FrameResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub frames: Vec<FrameReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub detections: Vec<DetectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class: String,
    pub class_id: u32,
    pub confidence: f32,
    /// `[x, y, w, h]` in source pixels.
    pub bbox: [i32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

impl DetectionRecord {
    pub fn new(det: &Detection, class: String) -> Self {
        Self {
            class,
            class_id: det.class_id,
            confidence: det.confidence,
            bbox: det.bbox.xywh(),
            track_id: det.track_id,
        }
    }
}

impl DetectionReport {
    pub fn push(&mut self, result: &FrameResult, label: impl Fn(u32) -> String) {
        self.frames.push(FrameReport {
            frame: result.frame_index,
            detections: result
                .detections
                .iter()
                .map(|det| DetectionRecord::new(det, label(det.class_id)))
                .collect(),
        });
    }

    pub fn total_detections(&self) -> usize {
        self.frames.iter().map(|f| f.detections.len()).sum()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize detection report")?;
        std::fs::write(path, json)
            .with_context(|| format!("write detection report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn report_uses_xywh_boxes_and_class_names() -> Result<()> {
        let mut report = DetectionReport::default();
        report.push(
            &FrameResult {
                frame_index: 3,
                detections: vec![Detection {
                    bbox: BoundingBox { x1: 10, y1: 20, x2: 40, y2: 60 },
                    confidence: 0.75,
                    class_id: 1,
                    track_id: None,
                }],
            },
            |id| if id == 1 { "car".to_string() } else { id.to_string() },
        );
        report.push(
            &FrameResult {
                frame_index: 4,
                detections: Vec::new(),
            },
            |id| id.to_string(),
        );

        let value = serde_json::to_value(&report)?;
        assert_eq!(value["frames"][0]["frame"], 3);
        assert_eq!(value["frames"][0]["detections"][0]["class"], "car");
        assert_eq!(
            value["frames"][0]["detections"][0]["bbox"],
            serde_json::json!([10, 20, 30, 40])
        );
        assert!(value["frames"][0]["detections"][0].get("track_id").is_none());
        assert_eq!(report.total_detections(), 1);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detections.json");
        report.write_json(&path)?;
        let parsed: DetectionReport = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed, report);
        Ok(())
    }
}
