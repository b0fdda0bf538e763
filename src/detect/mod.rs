mod backend;
mod backends;
mod decode;
mod nms;
mod registry;
mod result;
mod taxonomy;

pub use backend::{BackendCapability, InferenceBackend, RawTensor};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{InputLayout, TractBackend};
pub use decode::{BoxDecoder, DEFAULT_CONFIDENCE_THRESHOLD};
pub use nms::{suppress, top_k, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_RESULTS};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{Detection, DetectionResult};
pub use taxonomy::{LabelTable, Taxonomy, TaxonomyMode, UNKNOWN_LABEL};
