use anyhow::{anyhow, Result};

use crate::detect::backend::{BackendCapability, InferenceBackend, RawTensor};

/// Stub backend for testing. Returns a canned output for every input.
pub struct StubBackend {
    capability: BackendCapability,
    output: Option<RawTensor>,
    calls: u64,
}

impl StubBackend {
    /// Backend that always answers with `output`.
    pub fn new(capability: BackendCapability, output: RawTensor) -> Self {
        Self {
            capability,
            output: Some(output),
            calls: 0,
        }
    }

    /// Backend whose every inference fails.
    pub fn failing(capability: BackendCapability) -> Self {
        Self {
            capability,
            output: None,
            calls: 0,
        }
    }

    /// Detection backend with no anchors at all.
    pub fn empty_detections(num_classes: usize) -> Self {
        Self::new(
            BackendCapability::ObjectDetection,
            RawTensor {
                shape: vec![1, 0, 5 + num_classes],
                data: Vec::new(),
            },
        )
    }

    /// Depth backend answering with a constant `size x size` map.
    pub fn constant_depth(size: usize, value: f32) -> Self {
        Self::new(
            BackendCapability::DepthEstimation,
            RawTensor {
                shape: vec![1, size, size],
                data: vec![value; size * size],
            },
        )
    }

    /// Number of inference calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: BackendCapability) -> bool {
        capability == self.capability
    }

    fn infer(&mut self, _input: &RawTensor) -> Result<RawTensor> {
        self.calls += 1;
        self.output
            .clone()
            .ok_or_else(|| anyhow!("stub backend configured to fail"))
    }
}
