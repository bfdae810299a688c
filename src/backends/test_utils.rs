//! Mock backend for exercising the session pipeline without model files

use crate::{
    config::SessionConfig,
    error::{BgBlasterError, Result},
    inference::InferenceBackend,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mock backend producing a constant single-channel output
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    /// Value written to every output element
    value: f32,
    /// Spatial size of the output (height, width)
    output_size: (usize, usize),
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Mock backend whose output is `value` everywhere, at a 16x16 resolution
    #[must_use]
    pub fn constant(value: f32) -> Self {
        Self {
            initialized: false,
            value,
            output_size: (16, 16),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Set the spatial size (height, width) of the output
    #[must_use]
    pub fn with_output_size(mut self, height: usize, width: usize) -> Self {
        self.output_size = (height, width);
        self
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn failing_init() -> Self {
        let mut backend = Self::constant(1.0);
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn failing_inference() -> Self {
        let mut backend = Self::constant(1.0);
        backend.should_fail_inference = true;
        backend
    }

    /// Get the call history for verification in tests
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, model: &[u8], _config: &SessionConfig) -> Result<Duration> {
        self.record_call(&format!("initialize({} bytes)", model.len()));
        if self.should_fail_init {
            return Err(BgBlasterError::model_init("Mock initialization failure"));
        }
        self.initialized = true;
        Ok(Duration::from_millis(1))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call(&format!("infer({:?})", input.shape()));
        if !self.initialized {
            return Err(BgBlasterError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgBlasterError::inference("Mock inference failure"));
        }
        let (height, width) = self.output_size;
        Ok(Array4::from_elem((input.dim().0, 1, height, width), self.value))
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut backend = MockBackend::constant(0.5);
        let probe = backend.clone();
        backend.initialize(&[0; 4], &SessionConfig::default()).unwrap();
        backend.infer(&Array4::zeros((1, 3, 2, 2))).unwrap();

        assert_eq!(
            probe.call_history(),
            vec!["initialize(4 bytes)", "infer([1, 3, 2, 2])"]
        );
    }

    #[test]
    fn test_mock_failures() {
        let mut backend = MockBackend::failing_init();
        assert!(backend.initialize(&[], &SessionConfig::default()).is_err());

        let mut backend = MockBackend::failing_inference();
        backend.initialize(&[], &SessionConfig::default()).unwrap();
        assert!(matches!(
            backend.infer(&Array4::zeros((1, 3, 2, 2))),
            Err(BgBlasterError::Inference(_))
        ));
    }
}
