//! Inference backend abstraction and the factory seam that creates backends

use crate::config::{BackendType, SessionConfig};
use crate::error::{BgBlasterError, Result};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// Backends are moved onto the blocking worker pool while they run, hence `Send`.
pub trait InferenceBackend: Send {
    /// Load the model from its serialized ONNX bytes
    ///
    /// Returns the time spent loading.
    ///
    /// # Errors
    /// - Model parsing, optimization or runtime session failures (`ModelInit`)
    fn initialize(&mut self, model: &[u8], config: &SessionConfig) -> Result<Duration>;

    /// Run the forward pass on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Runtime failures or an output that is not a 4D tensor (`Inference`)
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Factory for creating inference backends, injected into the model session
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory creating the backends enabled through cargo features
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Tract => {
                #[cfg(feature = "tract")]
                {
                    Ok(Box::new(crate::backends::TractBackend::new()))
                }
                #[cfg(not(feature = "tract"))]
                {
                    Err(BgBlasterError::model_init(
                        "Tract backend not compiled in (enable the `tract` feature)",
                    ))
                }
            },
            BackendType::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    Ok(Box::new(crate::backends::OnnxBackend::new()))
                }
                #[cfg(not(feature = "onnx"))]
                {
                    Err(BgBlasterError::model_init(
                        "ONNX Runtime backend not compiled in (enable the `onnx` feature)",
                    ))
                }
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        backends
    }
}

/// Check the shape of a model output before it is turned into a pixel buffer
///
/// # Errors
/// - Not a single-channel `1x1xHxW` tensor with non-zero spatial size
pub fn validate_output_shape(output: &Array4<f32>) -> Result<(usize, usize)> {
    let (batch, channels, height, width) = output.dim();
    if batch != 1 || channels != 1 || height == 0 || width == 0 {
        return Err(BgBlasterError::inference(format!(
            "Expected 1x1xHxW output tensor, got {batch}x{channels}x{height}x{width}"
        )));
    }
    Ok((height, width))
}
