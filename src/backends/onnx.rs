//! ONNX Runtime backend implementation
//!
//! Runs the matting model through ONNX Runtime with support for multiple
//! execution providers (CPU, CUDA, `CoreML`).

use crate::config::{ExecutionProvider, SessionConfig};
use crate::error::{BgBlasterError, Result};
use crate::inference::InferenceBackend;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime backend for running the matting model
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bg_blaster::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a new uninitialized ONNX backend
    #[must_use]
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Execution providers to register for the requested provider, most preferred first.
    /// An empty list means plain CPU execution.
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider");
                    providers.push(coreml.build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    fn load_model(model_data: &[u8], config: &SessionConfig) -> Result<Session> {
        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgBlasterError::model_init(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgBlasterError::model_init(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgBlasterError::model_init(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
        };
        log::debug!("Threading: {intra_threads} intra-op threads");

        session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgBlasterError::model_init(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| {
                BgBlasterError::model_init(format!("Failed to create session from model data: {e}"))
            })
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, model: &[u8], config: &SessionConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        log::info!(
            "🚀 Initializing ONNX Runtime backend (provider: {})",
            config.execution_provider
        );

        self.session = Some(Self::load_model(model, config)?);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgBlasterError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgBlasterError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs and outputs, so tensor names do not matter
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgBlasterError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| BgBlasterError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| BgBlasterError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgBlasterError::inference(format!("Failed to extract output tensor: {e}")))?;

        let output_shape = output_tensor.shape();
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
            output_tensor.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgBlasterError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "⚡ ONNX inference: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output_array)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}
