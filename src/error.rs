//! Error types for background blasting operations

use thiserror::Error;

/// Result type alias for background blasting operations
pub type Result<T> = std::result::Result<T, BgBlasterError>;

/// Error taxonomy for the model session, compositor and their ambient plumbing
#[derive(Error, Debug)]
pub enum BgBlasterError {
    /// The model or its processor failed to load. Fatal to background removal
    /// for the lifetime of the session.
    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    /// `run` was called before a successful `initialize`
    #[error("Model session is not initialized")]
    NotInitialized,

    /// Decode, tensor or forward-pass failure for one specific image
    #[error("Inference error: {0}")]
    Inference(String),

    /// Drawing surface or PNG encoding failure for one specific image
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model hub transfer errors
    #[error("Network error: {0}")]
    Network(String),
}

impl BgBlasterError {
    /// Create a new model initialization error
    pub fn model_init<S: Into<String>>(msg: S) -> Self {
        Self::ModelInit(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create a network error carrying the underlying cause
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Re-wrap any error as a model initialization failure, keeping the cause's message.
    /// `ModelInit` errors pass through unchanged.
    #[must_use]
    pub fn into_model_init(self) -> Self {
        match self {
            Self::ModelInit(_) => self,
            other => Self::ModelInit(other.to_string()),
        }
    }
}
