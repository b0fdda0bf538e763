use anyhow::{anyhow, Result};

/// What a backend's model produces.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendCapability {
    /// `[1, anchors, 5 + classes]` detection records.
    ObjectDetection,
    /// `[1, H, W]` or `[1, H, W, 1]` depth or disparity map.
    DepthEstimation,
}

/// Dense f32 tensor exchanged with inference backends.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(anyhow!(
                "tensor shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    /// Letterboxed image input laid out as `[1, size, size, 3]`.
    pub fn image_input(data: Vec<f32>, size: u32) -> Result<Self> {
        let size = size as usize;
        Self::new(vec![1, size, size, 3], data)
    }
}

/// Inference backend trait.
///
/// The model runtime is an external collaborator; the pipeline only depends on
/// this seam. Backends own their loaded weights and may keep scratch state,
/// hence `&mut self`.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the loaded model provides a capability.
    fn supports(&self, capability: BackendCapability) -> bool;

    /// Run the model on one input tensor.
    fn infer(&mut self, input: &RawTensor) -> Result<RawTensor>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
