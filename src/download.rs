//! Model downloading from the model hub
//!
//! Files of a hub repository are streamed into a temporary directory and moved
//! into the cache only once every required file arrived, so a cache entry is
//! either complete or absent.

use crate::cache::ModelCache;
use crate::error::{BgBlasterError, Result};
use crate::models::ONNX_WEIGHT_FILES;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::HeaderMap;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Files every model repository must provide
const REQUIRED_FILES: &[&str] = &["config.json"];

/// Files fetched when present
const OPTIONAL_FILES: &[&str] = &["preprocessor_config.json"];

/// Model downloader with optional progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    endpoint: String,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a downloader writing into `cache` and fetching from `endpoint`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache, endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgBlasterError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// URL of one file of a hub repository
    #[must_use]
    pub fn file_url(&self, model_id: &str, file: &str) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            self.endpoint,
            model_id.trim_matches('/'),
            file
        )
    }

    /// Make sure a hub model is cached, downloading it when missing.
    /// Returns the cached model directory.
    ///
    /// # Errors
    /// - Invalid model identifier
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn ensure_model(&self, model_id: &str, show_progress: bool) -> Result<PathBuf> {
        validate_model_id(model_id)?;

        let final_dir = self.cache.model_path(model_id)?;
        if self.cache.is_model_cached(model_id) {
            log::debug!("Model already cached: {}", model_id);
            return Ok(final_dir);
        }

        log::info!("Downloading model {} from {}", model_id, self.endpoint);
        let temp_dir = Self::create_temp_download_dir(&ModelCache::model_id_to_dir(model_id))?;

        let progress = show_progress.then(Self::create_progress_indicator);

        match self
            .download_model_files(model_id, &temp_dir, progress.as_ref())
            .await
        {
            Ok(()) => {
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        BgBlasterError::file_io_error("remove stale model directory", &final_dir, &e)
                    })?;
                }
                if let Some(parent) = final_dir.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        BgBlasterError::file_io_error("create cache directory", parent, &e)
                    })?;
                }
                move_dir(&temp_dir, &final_dir)?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {model_id}"));
                }
                log::info!("Successfully downloaded model: {}", model_id);
                Ok(final_dir)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                    }
                }
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    fn create_temp_download_dir(dir_name: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!(
            "bg-blaster-{}-{}",
            dir_name,
            std::process::id()
        ));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                BgBlasterError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| BgBlasterError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    async fn download_model_files(
        &self,
        model_id: &str,
        download_dir: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        for file in REQUIRED_FILES {
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {file}"));
            }
            self.download_file(&self.file_url(model_id, file), &download_dir.join(file), progress)
                .await?;
        }

        for file in OPTIONAL_FILES {
            if let Err(e) = self
                .download_file(&self.file_url(model_id, file), &download_dir.join(file), progress)
                .await
            {
                log::debug!("Optional file {} not downloaded: {}", file, e);
            }
        }

        // One weight variant is enough; stop at the first that downloads
        for (file, variant) in ONNX_WEIGHT_FILES {
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {variant} weights"));
            }
            match self
                .download_file(&self.file_url(model_id, file), &download_dir.join(file), progress)
                .await
            {
                Ok(()) => {
                    log::info!("Downloaded {} weights", variant);
                    return Ok(());
                },
                Err(e) => log::warn!("Failed to download {} weights: {}", variant, e),
            }
        }

        Err(BgBlasterError::network_error(
            format!("Failed to download ONNX weights for {model_id}"),
            "no weight variant available",
        ))
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgBlasterError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgBlasterError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgBlasterError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        let expected_hash = expected_sha256(response.headers());
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgBlasterError::file_io_error("create file", local_path, &e))?;
        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| BgBlasterError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgBlasterError::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if let Some(total) = total_size {
                    pb.set_length(total);
                }
                pb.set_position(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| BgBlasterError::file_io_error("flush file", local_path, &e))?;
        drop(file);

        let actual_hash = format!("{:x}", hasher.finalize());
        if let Err(e) = verify_digest(url, &actual_hash, expected_hash.as_deref()) {
            log::warn!("{}", e);
            if let Err(remove_err) = fs::remove_file(local_path) {
                log::warn!("Failed to remove corrupt download: {}", remove_err);
            }
            return Err(e);
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    /// Model cache this downloader writes into
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Move a directory, falling back to copy + delete across file systems
fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    fs::remove_dir_all(from)
        .map_err(|e| BgBlasterError::file_io_error("remove temp directory", from, &e))
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| BgBlasterError::file_io_error("create directory", to, &e))?;
    let entries =
        fs::read_dir(from).map_err(|e| BgBlasterError::file_io_error("read directory", from, &e))?;
    for entry in entries {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| BgBlasterError::file_io_error("copy model file", &target, &e))?;
        }
    }
    Ok(())
}

/// Validate a hub repository identifier (`owner/repo`)
///
/// # Errors
/// - Empty identifier, identifier without exactly one `/`, or `.`/`..` segments
pub fn validate_model_id(model_id: &str) -> Result<()> {
    let trimmed = model_id.trim_matches('/');
    if trimmed.is_empty() {
        return Err(BgBlasterError::invalid_config("Model identifier cannot be empty"));
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
        return Err(BgBlasterError::invalid_config(format!(
            "Invalid hub model identifier '{model_id}'. Expected format: owner/repository"
        )));
    }
    Ok(())
}

/// SHA-256 the hub announces for a file, when it announces one
///
/// LFS-backed files carry their digest in `X-Linked-Etag` (or `ETag` once the
/// redirect to the storage backend has been followed). Plain git blob etags
/// are SHA-1 and are ignored.
#[must_use]
pub fn expected_sha256(headers: &HeaderMap) -> Option<String> {
    ["x-linked-etag", "etag"]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .map(|value| value.trim_start_matches("W/").trim_matches('"').to_ascii_lowercase())
        .find(|value| value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Compare a computed digest with the announced one. `None` skips verification.
///
/// # Errors
/// - Digest mismatch (`Network`)
pub fn verify_digest(url: &str, actual: &str, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(expected) if !actual.eq_ignore_ascii_case(expected) => {
            Err(BgBlasterError::network_error(
                format!("Integrity check failed for {url}"),
                format!("expected sha256 {expected}, got {actual}"),
            ))
        },
        _ => Ok(()),
    }
}
