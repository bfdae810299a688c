#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bg-blaster
//!
//! Background removal with the `briaai/RMBG-1.4` matting model. One source
//! image in, two PNG artifacts out: a grayscale alpha mask and a cut-out of
//! the source with the mask applied as transparency.
//!
//! ## Features
//!
//! - **Model Session**: lazy one-time model load from the hub cache (or a
//!   local directory), inference off the async thread by default
//! - **Compositor**: mask and composite surfaces, PNG encoding, artifact naming
//! - **UI Controller**: a pure reducer over [`AppState`] plus a rendering
//!   independent [`View`]
//! - **Backends**: Tract (pure Rust, default) and ONNX Runtime (`onnx` feature)
//! - **CLI**: the `bg-blaster` binary (`cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_blaster::{Controller, ModelSession, SessionConfig, SourceImage};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = ModelSession::new(SessionConfig::default())?;
//! let mut controller = Controller::new(session);
//!
//! controller.mount().await;
//! controller.select_file(SourceImage::from_path("cat.png".as_ref())?);
//! if controller.process().await {
//!     let view = controller.view();
//!     if let Some(mask) = view.mask {
//!         mask.write_to_dir(".".as_ref())?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference backend
//! - `onnx`: ONNX Runtime backend with CUDA and `CoreML` providers
//! - `cli` (default): command-line interface and progress reporting
//! - `webp-support` (default): WebP input decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use compositor::{artifact_names, compose};
pub use config::{BackendType, ExecutionProvider, RuntimeOptions, SessionConfig};
pub use controller::{reduce, AppState, Controller, ModelStatus, Phase, UiEvent, UiStage, View};
pub use download::ModelDownloader;
pub use error::{BgBlasterError, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use models::{ModelSource, PreprocessingConfig, DEFAULT_MODEL_ID};
pub use session::{MattingSession, ModelSession};
pub use types::{
    EncodedImage, ImageRecord, MaskStatistics, PixelBuffer, ProcessedImages, ProcessingTimings,
    SourceImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background of one encoded image with a fresh session
///
/// Loads the model, runs it once and returns both artifacts. For more than
/// one image keep a [`ModelSession`] around instead.
///
/// # Examples
///
/// ```rust,no_run
/// use bg_blaster::{remove_background, SessionConfig, SourceImage};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let images = remove_background(SourceImage::new("upload.jpg", upload), SessionConfig::default()).await?;
/// println!("{} -> {}", images.mask.file_name, images.composite.file_name);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `ModelInit` when the model cannot be obtained or loaded
/// - `Inference` or `Encoding` from the run itself
pub async fn remove_background(source: SourceImage, config: SessionConfig) -> Result<ProcessedImages> {
    let mut session = ModelSession::new(config)?;
    session.initialize().await?;
    session.run(&source).await
}
