//! Axis-aligned box geometry.
//!
//! Boxes are stored in center form (`cx`, `cy`, `width`, `height`) in original
//! image pixel coordinates. Corner coordinates are always derived, never stored,
//! so the two representations cannot drift apart.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in center form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
        }
    }

    /// Build a box from corner coordinates.
    pub fn from_corners(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            cx: (left + right) / 2.0,
            cy: (top + bottom) / 2.0,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn left(&self) -> f32 {
        self.cx - self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.cy - self.height / 2.0
    }

    pub fn right(&self) -> f32 {
        self.cx + self.width / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.cy + self.height / 2.0
    }

    /// Signed area. Degenerate boxes (negative extent) yield a non-positive value.
    pub fn area(&self) -> f32 {
        (self.right() - self.left()) * (self.bottom() - self.top())
    }

    /// Area of the overlap between two boxes, zero when disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x1 = self.left().max(other.left());
        let y1 = self.top().max(other.top());
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let w = (x2 - x1).max(0.0);
        let h = (y2 - y1).max(0.0);
        w * h
    }

    /// Intersection over union.
    ///
    /// Returns 0 when the union area is zero, negative or not finite, so
    /// degenerate boxes never divide by zero. The result lies in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if !(union > 0.0) || !union.is_finite() {
            return 0.0;
        }
        let ratio = intersection / union;
        if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
