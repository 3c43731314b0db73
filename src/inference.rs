//! Forward pass through a cached ONNX segmentation session

use crate::error::{Error, Result};
use crate::session_cache::SharedSession;
use ndarray::Array4;
use ort::value::Value;

/// Runs a single-input, single-output segmentation network
pub struct OnnxSegmenter {
    session: SharedSession,
}

impl std::fmt::Debug for OnnxSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSegmenter").finish_non_exhaustive()
    }
}

impl OnnxSegmenter {
    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    /// Run the network and return its first output as `(1, 1, H, W)` activations
    ///
    /// # Errors
    /// - Tensor conversion or ONNX Runtime failures
    /// - Output is not a 4D single-channel tensor
    pub fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let start = instant::Instant::now();
        let input_value = Value::from_array(input.clone())
            .map_err(|e| Error::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::internal("ONNX session lock poisoned"))?;

        // Positional inputs and outputs: U²-Net exports name them differently.
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| Error::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| Error::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| Error::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| Error::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        if shape.len() != 4 || shape.get(1).copied() != Some(1) {
            return Err(Error::inference(format!(
                "Expected a (1, 1, H, W) output tensor, got {shape:?}"
            )));
        }

        let data = output_tensor.view().to_owned().into_raw_vec_and_offset().0;
        let output = Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data)
            .map_err(|e| Error::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Inference {:?} -> {:?} in {:.2}ms",
            input.dim(),
            output.dim(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }
}
