//! Per-frame detection pipeline.
//!
//! preprocess → inference → decode → NMS → top-K → depth fusion.
//!
//! The active detector (weights + taxonomy) lives in a [`DetectorSlot`]. Each
//! frame takes one snapshot of the slot before it starts, so a mode switch
//! installed mid-frame only takes effect on the next frame.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::alert::{Announcer, SpeechSink};
use crate::depth::{fuse, DepthMap, DepthProjection, DepthSource};
use crate::detect::{
    suppress, top_k, BoxDecoder, Detection, DetectionResult, RawTensor, SharedBackend,
    TaxonomyMode, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_RESULTS,
};
use crate::frame::Frame;
use crate::preprocess::preprocess;

pub const DEFAULT_FRAME_SKIP: u32 = 3;
pub const DEFAULT_DETECTION_INPUT_SIZE: u32 = 640;
pub const DEFAULT_DEPTH_INPUT_SIZE: u32 = 256;

// ----------------------------------------------------------------------------
// Result delivery
// ----------------------------------------------------------------------------

/// Consumer of finished frames (rendering, speech).
pub trait ResultSink {
    fn deliver(&mut self, result: &DetectionResult);
}

impl<F> ResultSink for F
where
    F: FnMut(&DetectionResult),
{
    fn deliver(&mut self, result: &DetectionResult) {
        self(result)
    }
}

impl<S: SpeechSink> ResultSink for Announcer<S> {
    fn deliver(&mut self, result: &DetectionResult) {
        self.announce(&result.detections, Instant::now());
    }
}

// ----------------------------------------------------------------------------
// Frame skipping
// ----------------------------------------------------------------------------

/// Processes one frame out of every `interval`, starting with the first.
#[derive(Clone, Debug)]
pub struct FrameSkipper {
    interval: u32,
    count: u64,
}

impl FrameSkipper {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            count: 0,
        }
    }

    pub fn should_process(&mut self) -> bool {
        let take = self.count % self.interval as u64 == 0;
        self.count = self.count.wrapping_add(1);
        take
    }
}

// ----------------------------------------------------------------------------
// Detector: decoder + taxonomy + weights as one unit
// ----------------------------------------------------------------------------

/// Detection model bound to the decoder (and taxonomy) that matches its weights.
pub struct Detector {
    decoder: BoxDecoder,
    backend: SharedBackend,
    input_size: u32,
}

impl Detector {
    pub fn new(decoder: BoxDecoder, backend: SharedBackend, input_size: u32) -> Self {
        Self {
            decoder,
            backend,
            input_size,
        }
    }

    pub fn mode(&self) -> TaxonomyMode {
        self.decoder.taxonomy().mode()
    }

    pub fn decoder(&self) -> &BoxDecoder {
        &self.decoder
    }

    /// Preprocess, infer and decode. Candidates are not yet suppressed.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let prepared = preprocess(image, self.input_size)?;
        let input = RawTensor::image_input(prepared.input, self.input_size)?;
        let output = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("detection backend lock poisoned"))?;
            backend.infer(&input)?
        };
        self.decoder.decode(&output.data, &prepared.transform)
    }
}

/// Shared, swappable holder of the active [`Detector`].
#[derive(Clone)]
pub struct DetectorSlot {
    inner: Arc<RwLock<Arc<Detector>>>,
}

impl DetectorSlot {
    pub fn new(detector: Detector) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(detector))),
        }
    }

    /// Snapshot of the detector active right now.
    pub fn current(&self) -> Result<Arc<Detector>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("detector slot lock poisoned"))?;
        Ok(Arc::clone(&guard))
    }

    /// Replace the active detector. Frames already running keep their snapshot.
    pub fn install(&self, detector: Detector) -> Result<()> {
        let mode = detector.mode();
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow!("detector slot lock poisoned"))?;
        *guard = Arc::new(detector);
        log::info!("detector switched to {} taxonomy", mode);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    pub iou_threshold: f32,
    pub max_results: usize,
    pub frame_skip: u32,
    pub depth_input_size: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            frame_skip: DEFAULT_FRAME_SKIP,
            depth_input_size: DEFAULT_DEPTH_INPUT_SIZE,
        }
    }
}

pub struct Pipeline {
    slot: DetectorSlot,
    depth_backend: Option<SharedBackend>,
    settings: PipelineSettings,
    skipper: FrameSkipper,
}

impl Pipeline {
    pub fn new(slot: DetectorSlot, settings: PipelineSettings) -> Self {
        Self {
            slot,
            depth_backend: None,
            skipper: FrameSkipper::new(settings.frame_skip),
            settings,
        }
    }

    /// Attach a depth-estimation model used when a frame has no sensor depth.
    pub fn with_depth_backend(mut self, backend: SharedBackend) -> Self {
        self.depth_backend = Some(backend);
        self
    }

    pub fn slot(&self) -> &DetectorSlot {
        &self.slot
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Frame-skipping entry point. Returns `None` for skipped frames.
    pub fn process(&mut self, frame: &Frame) -> Option<DetectionResult> {
        self.process_with_depth(frame, None)
    }

    /// Like [`Pipeline::process`], with an optional sensor depth image for the frame.
    pub fn process_with_depth(
        &mut self,
        frame: &Frame,
        sensor_depth: Option<&dyn DepthSource>,
    ) -> Option<DetectionResult> {
        if !self.skipper.should_process() {
            return None;
        }
        Some(self.run(frame, sensor_depth))
    }

    /// Run every stage on one frame, without frame skipping.
    ///
    /// Never fails: any error degrades to an empty detection list for the frame.
    pub fn run(&self, frame: &Frame, sensor_depth: Option<&dyn DepthSource>) -> DetectionResult {
        let detections = match self.run_stages(frame, sensor_depth) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("frame {}: detection failed: {:#}", frame.id, err);
                Vec::new()
            }
        };
        DetectionResult {
            frame_id: frame.id,
            detections,
        }
    }

    fn run_stages(
        &self,
        frame: &Frame,
        sensor_depth: Option<&dyn DepthSource>,
    ) -> Result<Vec<Detection>> {
        let detector = self.slot.current()?;
        let image = frame.to_upright_rgb()?;

        let candidates = detector.detect(&image)?;
        let kept = suppress(candidates, self.settings.iou_threshold);
        let mut detections = top_k(kept, self.settings.max_results);
        if detections.is_empty() {
            return Ok(detections);
        }

        match sensor_depth {
            Some(depth) => {
                let (w, h) = depth.dimensions();
                let projection =
                    DepthProjection::stretch(image.width() as f32, image.height() as f32, w, h);
                fuse(&mut detections, depth, &projection);
            }
            None => {
                if let Err(err) = self.fuse_model_depth(&image, &mut detections) {
                    log::warn!("frame {}: depth estimation failed: {:#}", frame.id, err);
                }
            }
        }

        log::debug!(
            "frame {}: {} detections ({} taxonomy)",
            frame.id,
            detections.len(),
            detector.mode()
        );
        Ok(detections)
    }

    fn fuse_model_depth(&self, image: &RgbImage, detections: &mut [Detection]) -> Result<()> {
        let Some(backend) = &self.depth_backend else {
            return Ok(());
        };
        let size = self.settings.depth_input_size;
        let prepared = preprocess(image, size)?;
        let input = RawTensor::image_input(prepared.input, size)?;
        let output = {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("depth backend lock poisoned"))?;
            guard.infer(&input)?
        };
        let map = DepthMap::from_tensor(output)?;
        fuse(
            detections,
            &map,
            &DepthProjection::Letterbox(prepared.transform),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{StubBackend, Taxonomy};
    use std::sync::Mutex;

    #[test]
    fn skipper_takes_every_third_frame() {
        let mut skipper = FrameSkipper::new(3);
        let taken: Vec<bool> = (0..7).map(|_| skipper.should_process()).collect();
        assert_eq!(taken, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn skipper_with_interval_one_takes_everything() {
        let mut skipper = FrameSkipper::new(0);
        assert!((0..5).all(|_| skipper.should_process()));
    }

    #[test]
    fn slot_snapshot_survives_install() {
        let outdoor = Detector::new(
            BoxDecoder::new(Taxonomy::builtin(TaxonomyMode::Outdoor), 7).unwrap(),
            Arc::new(Mutex::new(StubBackend::empty_detections(7))),
            64,
        );
        let indoor = Detector::new(
            BoxDecoder::new(Taxonomy::builtin(TaxonomyMode::Indoor), 12).unwrap(),
            Arc::new(Mutex::new(StubBackend::empty_detections(12))),
            64,
        );
        let slot = DetectorSlot::new(outdoor);
        let in_flight = slot.current().unwrap();
        slot.install(indoor).unwrap();

        assert_eq!(in_flight.mode(), TaxonomyMode::Outdoor);
        assert_eq!(in_flight.decoder().num_classes(), 7);
        assert_eq!(slot.current().unwrap().mode(), TaxonomyMode::Indoor);
    }
}
