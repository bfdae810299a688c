//! Tract backend implementation
//!
//! Runs the matting model with Tract, a pure Rust inference engine with no
//! native dependencies. This is the default backend.

use crate::config::SessionConfig;
use crate::error::{BgBlasterError, Result};
use crate::inference::InferenceBackend;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running the matting model using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self { model: None }
    }

    fn load_model(model_data: &[u8]) -> Result<TractModel> {
        onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgBlasterError::model_init(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| BgBlasterError::model_init(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgBlasterError::model_init(format!("Failed to create runnable model: {e}"))
            })
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, model: &[u8], _config: &SessionConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let size_mb = model.len() as f64 / (1024.0 * 1024.0);
        log::info!("🚀 Initializing Tract backend");
        log::info!("📏 Model size: {size_mb:.2} MB");
        log::debug!(
            "⚡ Execution: CPU (pure Rust), {} cores available",
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        self.model = Some(Self::load_model(model)?);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgBlasterError::inference("Tract model not initialized"))?;

        log::debug!("🔮 Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgBlasterError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgBlasterError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgBlasterError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_shape = output_data.shape();
        if output_shape.len() != 4 {
            return Err(BgBlasterError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        }

        let output_array = Array4::from_shape_vec(
            (
                output_shape.first().copied().unwrap_or(1),
                output_shape.get(1).copied().unwrap_or(1),
                output_shape.get(2).copied().unwrap_or(1),
                output_shape.get(3).copied().unwrap_or(1),
            ),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgBlasterError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "✅ Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn name(&self) -> &'static str {
        "tract"
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
