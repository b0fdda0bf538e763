use serde::Serialize;

use crate::geometry::BoundingBox;

/// One recognized object instance, in original image coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Objectness of the decoded record, in `[0, 1]`.
    pub score: f32,
    pub class_id: usize,
    pub name: String,
    /// Set by depth fusion. `None` means unknown, which is not the same as zero.
    pub distance: Option<f32>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, class_id: usize, name: impl Into<String>) -> Self {
        Self {
            bbox,
            score,
            class_id,
            name: name.into(),
            distance: None,
        }
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }
}

/// Final output for one processed frame.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionResult {
    pub frame_id: u64,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    /// Highest-scoring detection, if any. Detections are kept in descending score order.
    pub fn primary(&self) -> Option<&Detection> {
        self.detections.first()
    }
}
