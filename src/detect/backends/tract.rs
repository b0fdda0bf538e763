#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{BackendCapability, InferenceBackend, RawTensor};

/// Channel layout the exported model expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLayout {
    /// `[1, H, W, 3]`, the layout produced by letterbox preprocessing.
    Nhwc,
    /// `[1, 3, H, W]`, common for ONNX exports.
    Nchw,
}

/// Tract-based backend for ONNX inference.
///
/// Loads a local model file once; inference runs entirely in memory.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    capability: BackendCapability,
    input_size: u32,
    layout: InputLayout,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        capability: BackendCapability,
        input_size: u32,
        layout: InputLayout,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let shape = match layout {
            InputLayout::Nhwc => tvec!(1, size, size, 3),
            InputLayout::Nchw => tvec!(1, 3, size, size),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract backend loaded {} ({:?}, {}px, {:?})",
            model_path.display(),
            capability,
            input_size,
            layout
        );

        Ok(Self {
            model,
            capability,
            input_size,
            layout,
        })
    }

    fn build_input(&self, input: &RawTensor) -> Result<Tensor> {
        let size = self.input_size as usize;
        if input.shape != [1, size, size, 3] {
            return Err(anyhow!(
                "input shape {:?} does not match model input {}x{}",
                input.shape,
                size,
                size
            ));
        }

        let tensor = match self.layout {
            InputLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_vec((1, size, size, 3), input.data.clone())
                    .context("failed to shape NHWC input")?
                    .into_tensor()
            }
            InputLayout::Nchw => {
                let data = &input.data;
                tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
                    data[(y * size + x) * 3 + c]
                })
                .into_tensor()
            }
        };
        Ok(tensor)
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: BackendCapability) -> bool {
        capability == self.capability
    }

    fn infer(&mut self, input: &RawTensor) -> Result<RawTensor> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        RawTensor::new(view.shape().to_vec(), view.iter().copied().collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        let blank = RawTensor::new(vec![1, size, size, 3], vec![0.0; size * size * 3])?;
        self.infer(&blank).map(|_| ())
    }
}
