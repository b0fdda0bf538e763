//! Raw detection tensor decoding.
//!
//! The network emits a flat grid of per-anchor records laid out as
//! `[cx, cy, w, h, objectness, class_0 .. class_{n-1}]`, with geometry
//! normalized to the square input. Records below the objectness threshold are
//! discarded; the rest are mapped back through the letterbox transform.

use anyhow::{anyhow, Result};

use crate::detect::result::Detection;
use crate::detect::taxonomy::Taxonomy;
use crate::geometry::BoundingBox;
use crate::preprocess::Letterbox;

/// Objectness below this value is discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

const BOX_FIELDS: usize = 5;

/// Decoder bound to one taxonomy and one class count.
///
/// The threshold is fixed at construction; it is not a per-call parameter.
#[derive(Clone, Debug)]
pub struct BoxDecoder {
    taxonomy: Taxonomy,
    num_classes: usize,
    confidence_threshold: f32,
}

impl BoxDecoder {
    pub fn new(taxonomy: Taxonomy, num_classes: usize) -> Result<Self> {
        Self::with_threshold(taxonomy, num_classes, DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn with_threshold(
        taxonomy: Taxonomy,
        num_classes: usize,
        confidence_threshold: f32,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(anyhow!("decoder needs at least one class"));
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold {} outside [0, 1]",
                confidence_threshold
            ));
        }
        if taxonomy.len() != num_classes {
            log::warn!(
                "{} taxonomy lists {} classes but the decoder expects {}; extra indices decode as unknown",
                taxonomy.mode(),
                taxonomy.len(),
                num_classes
            );
        }
        Ok(Self {
            taxonomy,
            num_classes,
            confidence_threshold,
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Length of a single anchor record.
    pub fn stride(&self) -> usize {
        BOX_FIELDS + self.num_classes
    }

    /// Decode a raw output tensor into unsorted candidate detections.
    pub fn decode(&self, raw: &[f32], transform: &Letterbox) -> Result<Vec<Detection>> {
        let stride = self.stride();
        if raw.len() % stride != 0 {
            return Err(anyhow!(
                "raw output length {} is not a multiple of record size {}",
                raw.len(),
                stride
            ));
        }
        if !(transform.scale > 0.0) {
            return Err(anyhow!("letterbox scale must be positive"));
        }

        let target = transform.target_size as f32;
        let mut detections = Vec::new();

        for record in raw.chunks_exact(stride) {
            let objectness = record[4];
            if !(objectness >= self.confidence_threshold) {
                continue;
            }

            let (cx, cy) = transform.inverse_point(record[0] * target, record[1] * target);
            let width = transform.inverse_length(record[2] * target);
            let height = transform.inverse_length(record[3] * target);
            if ![cx, cy, width, height].iter().all(|v| v.is_finite()) {
                log::debug!("skipping record with non-finite geometry");
                continue;
            }

            let class_id = argmax(&record[BOX_FIELDS..]);
            let name = self.taxonomy.label(class_id);

            detections.push(Detection::new(
                BoundingBox::new(cx, cy, width, height),
                objectness,
                class_id,
                name,
            ));
        }

        log::debug!(
            "decoded {} candidates from {} records",
            detections.len(),
            raw.len() / stride
        );
        Ok(detections)
    }
}

/// Index of the first maximum. NaN scores never win.
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &score) in scores.iter().enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::taxonomy::{TaxonomyMode, UNKNOWN_LABEL};

    fn record(cx: f32, cy: f32, w: f32, h: f32, obj: f32, classes: &[f32]) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, obj];
        r.extend_from_slice(classes);
        r
    }

    fn identity(target: u32) -> Letterbox {
        Letterbox {
            x_offset: 0,
            y_offset: 0,
            scale: 1.0,
            target_size: target,
        }
    }

    fn outdoor_decoder() -> BoxDecoder {
        BoxDecoder::new(Taxonomy::builtin(TaxonomyMode::Outdoor), 7).unwrap()
    }

    #[test]
    fn records_below_threshold_yield_empty_list() {
        let decoder = outdoor_decoder();
        let mut raw = record(0.5, 0.5, 0.1, 0.1, 0.29, &[0.0; 7]);
        raw.extend(record(0.2, 0.2, 0.1, 0.1, 0.0, &[1.0; 7]));
        let out = decoder.decode(&raw, &identity(640)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let decoder = outdoor_decoder();
        let raw = record(0.5, 0.5, 0.1, 0.1, 0.3, &[0.0; 7]);
        assert_eq!(decoder.decode(&raw, &identity(640)).unwrap().len(), 1);
    }

    #[test]
    fn geometry_is_mapped_back_through_letterbox() {
        let decoder = outdoor_decoder();
        // 1280x720 image letterboxed into 640: scale 0.5, y offset 140
        let transform = Letterbox::fit(1280, 720, 640).unwrap();
        let mut classes = [0.0; 7];
        classes[2] = 0.9;
        let raw = record(0.5, 0.5, 0.25, 0.125, 0.8, &classes);

        let out = decoder.decode(&raw, &transform).unwrap();
        assert_eq!(out.len(), 1);
        let d = &out[0];
        assert_eq!(d.bbox.cx, 640.0);
        assert_eq!(d.bbox.cy, (320.0 - 140.0) / 0.5);
        assert_eq!(d.bbox.width, 320.0);
        assert_eq!(d.bbox.height, 160.0);
        assert_eq!(d.score, 0.8);
        assert_eq!(d.class_id, 2);
        assert_eq!(d.name, "Person");
        assert_eq!(d.distance, None);
    }

    #[test]
    fn class_without_label_decodes_as_unknown() {
        let decoder = BoxDecoder::new(Taxonomy::builtin(TaxonomyMode::Outdoor), 9).unwrap();
        let mut classes = [0.0; 9];
        classes[8] = 1.0;
        let raw = record(0.5, 0.5, 0.1, 0.1, 0.9, &classes);
        let out = decoder.decode(&raw, &identity(640)).unwrap();
        assert_eq!(out[0].class_id, 8);
        assert_eq!(out[0].name, UNKNOWN_LABEL);
    }

    #[test]
    fn records_with_non_finite_geometry_are_dropped() {
        let decoder = outdoor_decoder();
        let mut raw = record(f32::NAN, 0.5, 0.1, 0.1, 0.9, &[0.0; 7]);
        raw.extend(record(0.5, 0.5, f32::INFINITY, 0.1, 0.9, &[0.0; 7]));
        raw.extend(record(0.5, 0.5, 0.1, 0.1, 0.9, &[0.0; 7]));
        raw.extend(record(0.5, f32::NEG_INFINITY, 0.1, 0.1, 0.9, &[0.0; 7]));

        let out = decoder.decode(&raw, &identity(640)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.cx, 320.0);
    }

    #[test]
    fn ragged_output_is_an_error() {
        let decoder = outdoor_decoder();
        assert!(decoder.decode(&[0.0; 13], &identity(640)).is_err());
    }

    #[test]
    fn first_maximum_wins_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[f32::NAN, 0.1]), 1);
    }

    #[test]
    fn zero_classes_rejected() {
        assert!(BoxDecoder::new(Taxonomy::builtin(TaxonomyMode::Indoor), 0).is_err());
    }
}
