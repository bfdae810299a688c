//! Model session: owns one loaded matting model and its processor
//!
//! The session is created cold, loaded once by [`MattingSession::initialize`]
//! and then used for any number of [`MattingSession::run`] calls. A failed run
//! leaves the session usable.

use crate::cache::ModelCache;
use crate::compositor;
use crate::config::SessionConfig;
use crate::download::ModelDownloader;
use crate::error::{BgBlasterError, Result};
use crate::inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
use crate::models::{ModelFiles, ModelInfo, ModelSource};
use crate::processor::ImageProcessor;
use crate::types::{ProcessedImages, SourceImage};
use async_trait::async_trait;
use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult};
use instant::Instant;
use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Level, Span};

/// A session able to turn a source image into mask and composite artifacts
#[async_trait]
pub trait MattingSession: Send {
    /// Load the model. Returns `Ok(true)` once loaded; repeated calls do not reload.
    ///
    /// # Errors
    /// - `ModelInit` carrying the underlying cause
    async fn initialize(&mut self) -> Result<bool>;

    /// Produce both artifacts for one source image
    ///
    /// # Errors
    /// - `NotInitialized` before a successful `initialize`
    /// - `Inference` for decode, tensor or forward pass failures
    /// - `Encoding` for compositing failures
    async fn run(&mut self, source: &SourceImage) -> Result<ProcessedImages>;

    /// Whether `initialize` succeeded
    fn is_loaded(&self) -> bool;

    /// Identifier of the configured model
    fn model_id(&self) -> &str;
}

/// Model session backed by an inference backend
pub struct ModelSession {
    config: SessionConfig,
    factory: Arc<dyn BackendFactory>,
    processor: ImageProcessor,
    backend: Option<Box<dyn InferenceBackend>>,
    model_info: Option<ModelInfo>,
    show_download_progress: bool,
    loaded: bool,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("model_id", &self.config.model_id)
            .field("backend_type", &self.config.backend_type)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    /// Create a session using the backends compiled into this build
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(DefaultBackendFactory))
    }

    /// Create a session with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(config: SessionConfig, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            processor: ImageProcessor::new(config.preprocessing.clone()),
            config,
            factory,
            backend: None,
            model_info: None,
            show_download_progress: false,
            loaded: false,
        })
    }

    /// Show a progress bar while model files download
    #[must_use]
    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Information about the loaded model
    #[must_use]
    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.model_info.as_ref()
    }

    /// Resolve the model directory, downloading from the hub when needed
    ///
    /// The returned future owns what it needs and does not borrow the session.
    ///
    /// # Errors
    /// - Cache or download failures
    pub fn resolve_model_dir(&self) -> impl Future<Output = Result<PathBuf>> + Send + 'static {
        locate_model_dir(self.config.clone(), self.show_download_progress)
    }

    async fn load(&mut self) -> Result<()> {
        let model_dir = self.resolve_model_dir().await?;
        let files = ModelFiles::locate(&model_dir)?;

        if let Some(shipped) = files.preprocessor_config() {
            if shipped != self.config.preprocessing {
                warn!("Model ships different processor parameters; using the configured ones");
            }
        }

        let weights = files.read_weights()?;
        let model_info = ModelInfo {
            name: self.config.model_id.clone(),
            variant: files.variant.clone(),
            size_bytes: weights.len(),
        };

        let mut backend = self.factory.create_backend(self.config.backend_type)?;
        let config = self.config.clone();

        let (backend, load_time) = if self.config.runtime.proxy {
            tokio::task::spawn_blocking(move || {
                let load_time = backend.initialize(&weights, &config)?;
                Ok::<_, BgBlasterError>((backend, load_time))
            })
            .await
            .map_err(|e| BgBlasterError::model_init(format!("Model loading task failed: {e}")))??
        } else {
            let load_time = backend.initialize(&weights, &config)?;
            (backend, load_time)
        };

        info!(
            model = %model_info.name,
            variant = %model_info.variant,
            backend = backend.name(),
            load_ms = load_time.as_millis() as u64,
            "Model loaded"
        );

        self.backend = Some(backend);
        self.model_info = Some(model_info);
        Ok(())
    }
}

#[async_trait]
impl MattingSession for ModelSession {
    #[instrument(skip(self), fields(model = %self.config.model_id, backend = %self.config.backend_type))]
    async fn initialize(&mut self) -> Result<bool> {
        if self.loaded {
            return Ok(true);
        }

        self.load().await.map_err(BgBlasterError::into_model_init)?;
        self.loaded = true;
        Ok(true)
    }

    #[instrument(skip(self, source), fields(file = %source.name, bytes = source.bytes.len()))]
    async fn run(&mut self, source: &SourceImage) -> Result<ProcessedImages> {
        if !self.loaded {
            return Err(BgBlasterError::NotInitialized);
        }
        let mut backend = self.backend.take().ok_or(BgBlasterError::NotInitialized)?;

        if !self.config.runtime.proxy {
            let result = run_pipeline(&self.processor, backend.as_mut(), source);
            self.backend = Some(backend);
            return result;
        }

        let processor = self.processor.clone();
        let source = source.clone();
        let span = Span::current();
        let task = tokio::task::spawn_blocking(move || {
            let result = span.in_scope(|| run_pipeline(&processor, backend.as_mut(), &source));
            (backend, result)
        });

        match task.await {
            Ok((backend, result)) => {
                self.backend = Some(backend);
                result
            },
            Err(e) => {
                // The backend went down with the worker
                self.loaded = false;
                Err(BgBlasterError::inference(format!("Inference worker failed: {e}")))
            },
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

async fn locate_model_dir(config: SessionConfig, show_progress: bool) -> Result<PathBuf> {
    let source = ModelSource::resolve(&config.model_id, config.runtime.allow_local_models);
    debug!(source = %source.display_name(), "Resolving model");

    match source {
        ModelSource::Local(path) => Ok(path),
        ModelSource::Hub(model_id) => {
            let cache = ModelCache::from_config_root(config.cache_dir.as_deref())?;
            let downloader = ModelDownloader::new(cache, &config.hub_endpoint)?;
            downloader.ensure_model(&model_id, show_progress).await
        },
    }
}

/// Decode an image the way viewers display it, with its EXIF orientation applied
fn decode_oriented(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Decode, preprocess, infer, postprocess and composite one image
fn run_pipeline(
    processor: &ImageProcessor,
    backend: &mut dyn InferenceBackend,
    source: &SourceImage,
) -> Result<ProcessedImages> {
    let total_start = Instant::now();

    let decode_start = Instant::now();
    let image = decode_oriented(&source.bytes).map_err(|e| {
        BgBlasterError::inference(format!("Failed to decode {}: {e}", source.name))
    })?;
    let decode_ms = decode_start.elapsed().as_millis() as u64;
    let dimensions = (image.width(), image.height());

    let preprocess_start = Instant::now();
    let input = {
        let _span = span!(
            Level::DEBUG,
            "preprocessing",
            width = dimensions.0,
            height = dimensions.1
        )
        .entered();
        processor.preprocess(&image)?
    };
    let preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

    let inference_start = Instant::now();
    let output = {
        let _span = span!(Level::DEBUG, "inference", backend = backend.name()).entered();
        backend.infer(&input).map_err(|e| match e {
            BgBlasterError::Inference(_) => e,
            other => BgBlasterError::inference(other.to_string()),
        })?
    };
    let inference_ms = inference_start.elapsed().as_millis() as u64;

    let postprocess_start = Instant::now();
    let buffer = {
        let _span = span!(Level::DEBUG, "postprocessing").entered();
        processor.postprocess(&output, dimensions)?
    };
    let postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

    let mut images = {
        let _span = span!(Level::DEBUG, "compositing").entered();
        compositor::compose(&image, &source.name, &buffer)?
    };

    images.timings.decode_ms = decode_ms;
    images.timings.preprocessing_ms = preprocessing_ms;
    images.timings.inference_ms = inference_ms;
    images.timings.postprocessing_ms = postprocessing_ms;
    images.timings.total_ms = total_start.elapsed().as_millis() as u64;

    debug!(timings = %images.timings.summary(), "Run complete");
    Ok(images)
}
