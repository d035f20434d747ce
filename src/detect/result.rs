/// Candidate object as produced by a detector backend.
///
/// Coordinates are model-input pixels, corners in (x1, y1, x2, y2) order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl RawDetection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    /// Parse one output row `[x1, y1, x2, y2, conf, class?]`.
    ///
    /// Rows shorter than five values are rejected. A missing class is 0.
    pub fn from_row(row: &[f32]) -> Option<Self> {
        if row.len() < 5 {
            return None;
        }
        let class_id = row
            .get(5)
            .map(|class| if class.is_finite() && *class > 0.0 { *class as u32 } else { 0 })
            .unwrap_or(0);
        Some(Self::new(row[0], row[1], row[2], row[3], row[4], class_id))
    }
}

/// Box corners in source-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// (x, y, w, h) form used in reports.
    pub fn xywh(&self) -> [i32; 4] {
        [self.x1, self.y1, self.width(), self.height()]
    }

    /// Intersection over union. Zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0) as i64 * (iy2 - iy1).max(0) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }
}

/// Detection rescaled to the source frame that survived filtering and NMS.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    /// Persistent identity from an external tracker, when one ran.
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// Detections for one real source frame, in NMS survivor order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameResult {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}
