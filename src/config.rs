//! Configuration types for the model session

use crate::error::{BgBlasterError, Result};
use crate::models::{PreprocessingConfig, DEFAULT_MODEL_ID};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default model hub endpoint
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Environment variable overriding the model cache root
pub const CACHE_DIR_ENV: &str = "BG_BLASTER_CACHE_DIR";

/// Environment variable overriding the model hub endpoint
pub const HUB_ENDPOINT_ENV: &str = "BG_BLASTER_HUB_ENDPOINT";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgBlasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgBlasterError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Inference runtime used to execute the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "tract") || !cfg!(feature = "onnx") {
            Self::Tract
        } else {
            Self::Onnx
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Runtime options applied by `initialize` before the model is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Consult local model directories. When false every identifier is resolved
    /// against the model hub (through the download cache).
    pub allow_local_models: bool,
    /// Run the CPU-bound pipeline on the blocking worker pool instead of the
    /// calling task
    pub proxy: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            allow_local_models: false,
            proxy: true,
        }
    }
}

/// Configuration of a model session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model repository identifier (or local directory, see `RuntimeOptions`)
    pub model_id: String,
    /// Runtime options applied at initialization
    pub runtime: RuntimeOptions,
    /// Inference runtime
    pub backend_type: BackendType,
    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Root of the model cache (None = XDG cache dir or `BG_BLASTER_CACHE_DIR`)
    pub cache_dir: Option<PathBuf>,
    /// Model hub endpoint
    pub hub_endpoint: String,
    /// Processor parameters
    pub preprocessing: PreprocessingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            runtime: RuntimeOptions::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            cache_dir: std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from),
            hub_endpoint: std::env::var(HUB_ENDPOINT_ENV)
                .unwrap_or_else(|_| DEFAULT_HUB_ENDPOINT.to_string()),
            preprocessing: PreprocessingConfig::rmbg(),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bg_blaster::{BackendType, SessionConfig};
    ///
    /// let config = SessionConfig::builder()
    ///     .backend_type(BackendType::Tract)
    ///     .proxy(false)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.model_id, "briaai/RMBG-1.4");
    /// ```
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    /// - Empty model identifier
    /// - Hub endpoint that is not an http(s) URL
    /// - Invalid processor parameters
    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(BgBlasterError::invalid_config("Model identifier cannot be empty"));
        }
        if !(self.hub_endpoint.starts_with("https://") || self.hub_endpoint.starts_with("http://"))
        {
            return Err(BgBlasterError::invalid_config(format!(
                "Hub endpoint must be an http(s) URL, got '{}'",
                self.hub_endpoint
            )));
        }
        if self.intra_threads > 1024 {
            return Err(BgBlasterError::invalid_config(format!(
                "Invalid intra_threads: {} (valid range: 0-1024)",
                self.intra_threads
            )));
        }
        self.preprocessing.validate()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.config.model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn allow_local_models(mut self, allow: bool) -> Self {
        self.config.runtime.allow_local_models = allow;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: bool) -> Self {
        self.config.runtime.proxy = proxy;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn hub_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.hub_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.config.preprocessing = preprocessing;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`SessionConfig::validate`]
    pub fn build(self) -> Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
