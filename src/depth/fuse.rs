use crate::depth::source::DepthSource;
use crate::detect::Detection;
use crate::geometry::BoundingBox;
use crate::preprocess::Letterbox;

/// How original-image boxes map into depth-image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DepthProjection {
    /// The depth image was produced from the same frame letterboxed into a square
    /// of `target_size`; boxes go through the forward letterbox transform and are
    /// clamped to `[0, target_size - 1]`.
    Letterbox(Letterbox),
    /// The depth image covers the same field of view at a different resolution;
    /// coordinates are scaled per axis and clamped to the depth image bounds.
    Stretch { scale_x: f32, scale_y: f32 },
}

/// Half-open pixel rectangle `left..right` x `top..bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRegion {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl PixelRegion {
    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }
}

impl DepthProjection {
    /// Scale factors from the original image to the given depth image size.
    pub fn stretch(
        image_width: f32,
        image_height: f32,
        depth_width: usize,
        depth_height: usize,
    ) -> Self {
        DepthProjection::Stretch {
            scale_x: depth_width as f32 / image_width,
            scale_y: depth_height as f32 / image_height,
        }
    }

    /// Project a box into a clamped depth-image region.
    pub fn project(&self, bbox: &BoundingBox, depth_dims: (usize, usize)) -> PixelRegion {
        let (cx, cy, w, h, max_x, max_y) = match *self {
            DepthProjection::Letterbox(t) => {
                let limit = (t.target_size as i64 - 1).max(0);
                (
                    (bbox.cx * t.scale + t.x_offset as f32) as i64,
                    (bbox.cy * t.scale + t.y_offset as f32) as i64,
                    (bbox.width * t.scale) as i64,
                    (bbox.height * t.scale) as i64,
                    limit,
                    limit,
                )
            }
            DepthProjection::Stretch { scale_x, scale_y } => (
                (bbox.cx * scale_x) as i64,
                (bbox.cy * scale_y) as i64,
                (bbox.width * scale_x) as i64,
                (bbox.height * scale_y) as i64,
                (depth_dims.0 as i64 - 1).max(0),
                (depth_dims.1 as i64 - 1).max(0),
            ),
        };

        // float-to-int casts saturate; keep the corner arithmetic saturating too
        let clamp = |v: i64, max: i64| v.clamp(0, max) as usize;
        PixelRegion {
            left: clamp(cx.saturating_sub(w / 2), max_x),
            top: clamp(cy.saturating_sub(h / 2), max_y),
            right: clamp(cx.saturating_add(w / 2), max_x),
            bottom: clamp(cy.saturating_add(h / 2), max_y),
        }
    }
}

/// Attach a median distance to every detection.
///
/// Samples inside the projected region that the source reports as valid are
/// collected; the distance is the lower median (`sorted[len / 2]`). When no
/// sample is collected the distance is left unset.
pub fn fuse(detections: &mut [Detection], depth: &dyn DepthSource, projection: &DepthProjection) {
    let dims = depth.dimensions();
    for (index, detection) in detections.iter_mut().enumerate() {
        let region = projection.project(&detection.bbox, dims);
        if region.is_empty() {
            log::debug!("[{}] {}: box projects to an empty region", index, detection.name);
            continue;
        }
        let mut samples: Vec<f32> = Vec::new();
        for y in region.top..region.bottom {
            for x in region.left..region.right {
                if let Some(value) = depth.sample(x, y) {
                    if !value.is_nan() {
                        samples.push(value);
                    }
                }
            }
        }

        if samples.is_empty() {
            log::debug!("[{}] {}: no depth samples in {:?}", index, detection.name, region);
            continue;
        }

        samples.sort_by(f32::total_cmp);
        let median = samples[samples.len() / 2];
        log::debug!(
            "[{}] {}: median depth {} over {} samples",
            index,
            detection.name,
            median,
            samples.len()
        );
        detection.distance = Some(median);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::source::{DepthMap, SensorDepth};

    fn det(cx: f32, cy: f32, w: f32, h: f32) -> Detection {
        Detection::new(BoundingBox::new(cx, cy, w, h), 0.9, 0, "Person")
    }

    fn identity(target: u32) -> DepthProjection {
        DepthProjection::Letterbox(Letterbox {
            x_offset: 0,
            y_offset: 0,
            scale: 1.0,
            target_size: target,
        })
    }

    fn gradient_map(size: usize) -> DepthMap {
        let data = (0..size * size).map(|i| (i % size) as f32).collect();
        DepthMap::new(size, size, data).unwrap()
    }

    #[test]
    fn all_zero_map_fuses_to_zero_not_none() {
        let map = DepthMap::new(16, 16, vec![0.0; 256]).unwrap();
        let mut dets = vec![det(8.0, 8.0, 4.0, 4.0)];
        fuse(&mut dets, &map, &identity(16));
        assert_eq!(dets[0].distance, Some(0.0));
    }

    #[test]
    fn box_outside_target_leaves_distance_unset() {
        let map = gradient_map(16);
        let mut dets = vec![det(100.0, 100.0, 10.0, 10.0)];
        fuse(&mut dets, &map, &identity(16));
        assert_eq!(dets[0].distance, None);
    }

    #[test]
    fn extreme_geometry_is_clamped_without_overflow() {
        let map = gradient_map(16);
        let mut dets = vec![
            det(1e30, 8.0, 1e30, 4.0),
            det(-1e30, -1e30, -1e30, 1e30),
            det(f32::NAN, 8.0, f32::NAN, 4.0),
            det(8.0, 8.0, f32::INFINITY, f32::INFINITY),
        ];
        fuse(&mut dets, &map, &identity(16));
        assert_eq!(dets[0].distance, None);
        assert_eq!(dets[1].distance, None);
        assert_eq!(dets[2].distance, None);
        // clamped to the full 0..15 region: 15 copies of each column value 0..=14
        assert_eq!(dets[3].distance, Some(7.0));

        let region = DepthProjection::stretch(16.0, 16.0, 16, 16)
            .project(&BoundingBox::new(f32::INFINITY, 0.0, f32::INFINITY, 1.0), (16, 16));
        assert!(region.is_empty());
    }

    #[test]
    fn median_is_lower_middle_element() {
        // columns 2..6 of a gradient map: values 2,3,4,5 per row -> lower median is 4
        let map = gradient_map(16);
        let mut dets = vec![det(4.0, 4.0, 4.0, 4.0)];
        fuse(&mut dets, &map, &identity(16));
        assert_eq!(dets[0].distance, Some(4.0));
    }

    #[test]
    fn letterbox_projection_applies_scale_and_offset() {
        let t = Letterbox {
            x_offset: 0,
            y_offset: 32,
            scale: 0.5,
            target_size: 256,
        };
        let region = DepthProjection::Letterbox(t).project(
            &BoundingBox::new(100.0, 100.0, 40.0, 20.0),
            (256, 256),
        );
        assert_eq!(
            region,
            PixelRegion {
                left: 40,
                top: 77,
                right: 60,
                bottom: 87,
            }
        );
    }

    #[test]
    fn fusion_is_deterministic() {
        let data: Vec<f32> = (0..64 * 64).map(|i| ((i * 7919) % 97) as f32).collect();
        let map = DepthMap::new(64, 64, data).unwrap();
        let mut first = vec![det(30.0, 25.0, 21.0, 17.0)];
        fuse(&mut first, &map, &identity(64));
        for _ in 0..10 {
            let mut again = vec![det(30.0, 25.0, 21.0, 17.0)];
            fuse(&mut again, &map, &identity(64));
            assert_eq!(again[0].distance, first[0].distance);
        }
        assert!(first[0].distance.is_some());
    }

    #[test]
    fn sensor_depth_uses_stretch_projection_and_meters() {
        // 4x4 sensor image, every reading 1200 mm except one hole
        let mut bytes = Vec::new();
        for i in 0..16u16 {
            let mm: u16 = if i == 5 { 0 } else { 1200 };
            bytes.extend_from_slice(&mm.to_le_bytes());
        }
        let sensor = SensorDepth::new(&bytes, 4, 4, 8).unwrap();
        let projection = DepthProjection::stretch(512.0, 512.0, 4, 4);

        // covers sensor pixels (1,1)..(3,3), one of which is the hole
        let mut dets = vec![det(256.0, 256.0, 384.0, 384.0)];
        fuse(&mut dets, &sensor, &projection);
        assert_eq!(dets[0].distance, Some(1.2));
    }
}
