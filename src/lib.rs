//! Sightline kernel
//!
//! Post-processing core for on-device object detection with distance
//! estimation. The inference runtime, camera, renderer and speech engine are
//! external collaborators; this crate turns raw frames and raw model tensors
//! into a short, ranked list of labeled detections with distances.
//!
//! # Pipeline
//!
//! 1. **Preprocess**: letterbox the upright frame into the square model input.
//! 2. **Infer**: hand the packed tensor to an [`InferenceBackend`].
//! 3. **Decode**: map anchor records back to image space, resolve class names.
//! 4. **Suppress**: greedy NMS, then keep the top results.
//! 5. **Fuse**: attach a median distance from a model or sensor depth image.
//!
//! # Module Structure
//!
//! - `geometry`: canonical bounding box and IoU
//! - `frame`: frame container, NV12/RGB normalization, rotation
//! - `preprocess`: letterbox transform and input packing
//! - `detect`: taxonomies, decoder, NMS, inference backends
//! - `depth`: depth sources and median fusion
//! - `pipeline`: per-frame orchestration, frame skipping, detector swapping
//! - `worker`: background thread with drop-when-busy dispatch
//! - `alert`: spoken proximity alerts
//! - `config`: JSON file + environment configuration

pub mod alert;
pub mod config;
pub mod depth;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod preprocess;
pub mod worker;

pub use alert::{AlertGate, AlertPolicy, Announcer, LogSpeech, Proximity, SpeechSink};
pub use config::PipelineConfig;
pub use depth::{fuse, DepthMap, DepthProjection, DepthSource, SensorDepth};
pub use detect::{
    suppress, top_k, BackendCapability, BackendRegistry, BoxDecoder, Detection, DetectionResult,
    InferenceBackend, LabelTable, RawTensor, SharedBackend, StubBackend, Taxonomy, TaxonomyMode,
};
pub use frame::{Frame, PixelFormat, Rotation};
pub use geometry::BoundingBox;
pub use pipeline::{
    Detector, DetectorSlot, FrameSkipper, Pipeline, PipelineSettings, ResultSink,
};
pub use preprocess::{preprocess, Letterbox, PreprocessResult};
pub use worker::{FrameWorker, Submission};
