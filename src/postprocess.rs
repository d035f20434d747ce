//! Raw detector output to source-frame detections.
//!
//! Per frame: confidence filter, rescale from model input to source
//! resolution, then greedy non-max suppression.

use crate::detect::{BoundingBox, Detection, InputSpec, RawDetection};

/// Thresholds and geometry for one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Postprocessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input: InputSpec,
}

impl Postprocessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, input: InputSpec) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            input,
        }
    }

    /// Filter, rescale and suppress one frame's raw detections.
    pub fn process(&self, raw: &[RawDetection], source_width: u32, source_height: u32) -> Vec<Detection> {
        let candidates = raw
            .iter()
            .filter(|det| det.confidence >= self.confidence_threshold)
            .map(|det| Detection {
                bbox: rescale(det, &self.input, source_width, source_height),
                confidence: det.confidence,
                class_id: det.class_id,
                track_id: None,
            })
            .collect();
        non_max_suppression(candidates, self.iou_threshold)
    }
}

/// Map a model-space box onto the source frame.
///
/// Each axis scales independently (`coord * source / input`), truncates toward
/// zero and is clamped to `[0, source]`.
pub fn rescale(
    det: &RawDetection,
    input: &InputSpec,
    source_width: u32,
    source_height: u32,
) -> BoundingBox {
    let sx = source_width as f32 / input.width as f32;
    let sy = source_height as f32 / input.height as f32;
    let scale = |value: f32, factor: f32, max: u32| -> i32 {
        let scaled = value * factor;
        if !scaled.is_finite() {
            return 0;
        }
        (scaled as i32).clamp(0, max as i32)
    };
    BoundingBox {
        x1: scale(det.x1, sx, source_width),
        y1: scale(det.y1, sy, source_height),
        x2: scale(det.x2, sx, source_width),
        y2: scale(det.y2, sy, source_height),
    }
}

/// Greedy NMS.
///
/// Candidates are visited by descending confidence (ties keep input order).
/// A candidate is kept unless its IoU with an already kept box exceeds
/// `iou_threshold`. Survivors are returned in the order they were kept.
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
