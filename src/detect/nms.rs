//! Greedy non-maximum suppression.

use crate::detect::result::Detection;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Remove overlapping duplicates, keeping the highest-scoring box of each cluster.
///
/// Detections are stably sorted by descending score; each kept detection
/// removes every remaining detection whose IoU with it is strictly greater
/// than `iou_threshold`. Output stays in descending score order.
pub fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    let mut remaining = detections;

    while !remaining.is_empty() {
        let best = remaining.remove(0);
        remaining.retain(|other| best.iou(other) <= iou_threshold);
        kept.push(best);
    }

    kept
}

/// Keep the first `k` detections. Input is expected in descending score order.
pub fn top_k(mut detections: Vec<Detection>, k: usize) -> Vec<Detection> {
    detections.truncate(k);
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn det(cx: f32, cy: f32, w: f32, h: f32, score: f32) -> Detection {
        Detection::new(BoundingBox::new(cx, cy, w, h), score, 0, "Person")
    }

    fn random_detections(rng: &mut StdRng, n: usize) -> Vec<Detection> {
        (0..n)
            .map(|_| {
                det(
                    rng.gen_range(0.0..200.0),
                    rng.gen_range(0.0..200.0),
                    rng.gen_range(1.0..80.0),
                    rng.gen_range(1.0..80.0),
                    rng.gen_range(0.3..1.0),
                )
            })
            .collect()
    }

    #[test]
    fn overlapping_lower_score_box_is_removed() {
        let out = suppress(
            vec![
                det(105.0, 105.0, 50.0, 50.0, 0.8),
                det(100.0, 100.0, 50.0, 50.0, 0.9),
            ],
            DEFAULT_IOU_THRESHOLD,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9);
        assert_eq!(out[0].bbox.cx, 100.0);
    }

    #[test]
    fn separated_boxes_survive_in_score_order() {
        let out = suppress(
            vec![
                det(10.0, 10.0, 5.0, 5.0, 0.4),
                det(100.0, 100.0, 5.0, 5.0, 0.95),
                det(300.0, 10.0, 5.0, 5.0, 0.6),
            ],
            DEFAULT_IOU_THRESHOLD,
        );
        let scores: Vec<f32> = out.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.95, 0.6, 0.4]);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        assert!(suppress(Vec::new(), DEFAULT_IOU_THRESHOLD).is_empty());
        assert!(top_k(Vec::new(), DEFAULT_MAX_RESULTS).is_empty());
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let out = suppress(
            vec![det(10.0, 10.0, 5.0, 5.0, 0.5), det(90.0, 90.0, 5.0, 5.0, 0.5)],
            DEFAULT_IOU_THRESHOLD,
        );
        assert_eq!(out[0].bbox.cx, 10.0);
        assert_eq!(out[1].bbox.cx, 90.0);
    }

    #[test]
    fn suppress_is_idempotent_and_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let input = random_detections(&mut rng, 40);
            let once = suppress(input.clone(), DEFAULT_IOU_THRESHOLD);
            let twice = suppress(once.clone(), DEFAULT_IOU_THRESHOLD);
            assert!(once.len() <= input.len());
            assert_eq!(once, twice);

            let truncated = top_k(once, DEFAULT_MAX_RESULTS);
            assert!(truncated.len() <= DEFAULT_MAX_RESULTS);
            assert!(truncated.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}
