#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::OccupancyClassifier;
use crate::detect::result::ClassScores;
use crate::frame::PatchSize;

/// Tract-based ONNX occupancy classifier.
///
/// Expects a model with a single `1x3xHxW` f32 input and a two-value
/// `[empty, occupied]` output. Only the model file is read from disk.
pub struct TractClassifier {
    model: TypedRunnableModel<TypedModel>,
    input: PatchSize,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input: PatchSize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input.height as usize, input.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input })
    }

    fn build_input(&self, tensor: &[f32]) -> Result<Tensor> {
        if tensor.len() != self.input.tensor_len() {
            return Err(anyhow!(
                "expected {} tensor values, received {}",
                self.input.tensor_len(),
                tensor.len()
            ));
        }
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, 3, self.input.height as usize, self.input.width as usize),
            tensor.to_vec(),
        )
        .context("reshape patch tensor")?;
        Ok(input.into_tensor())
    }
}

impl OccupancyClassifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> PatchSize {
        self.input
    }

    fn classify(&mut self, tensor: &[f32]) -> Result<ClassScores> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        ClassScores::from_slice(&scores)
    }
}
