//! Model cache management for models fetched from the hub
//!
//! Cached repositories live under `<cache root>/models/<owner>--<repo>` with
//! the same layout as the hub repository (`config.json`, optional
//! `preprocessor_config.json`, `onnx/*.onnx`).

use crate::config::CACHE_DIR_ENV;
use crate::download::validate_model_id;
use crate::error::{BgBlasterError, Result};
use crate::models::ONNX_WEIGHT_FILES;
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Cache directory name (`owner--repo`)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether the model ships a preprocessor config
    pub has_preprocessor: bool,
    /// Available ONNX weight variants (fp32, fp16, quantized)
    pub variants: Vec<String>,
    /// Size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache in the default location
    ///
    /// Uses `BG_BLASTER_CACHE_DIR` when set, otherwise the XDG cache directory:
    /// - Linux/macOS: `~/.cache/bg-blaster/models/`
    /// - Windows: `%LOCALAPPDATA%/bg-blaster/models/`
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        if let Some(root) = std::env::var_os(CACHE_DIR_ENV) {
            return Self::with_custom_cache_dir(Path::new(&root));
        }

        let root = dirs::cache_dir()
            .ok_or_else(|| {
                BgBlasterError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("bg-blaster");
        Self::with_custom_cache_dir(&root)
    }

    /// Create a cache rooted at a custom directory (models go to `<root>/models`)
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(root: &Path) -> Result<Self> {
        let cache_dir = root.join("models");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgBlasterError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Create a cache from an optional configured root
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn from_config_root(root: Option<&Path>) -> Result<Self> {
        match root {
            Some(root) => Self::with_custom_cache_dir(root),
            None => Self::new(),
        }
    }

    /// Convert a hub repository identifier into a cache directory name
    ///
    /// ```
    /// use bg_blaster::cache::ModelCache;
    ///
    /// assert_eq!(ModelCache::model_id_to_dir("briaai/RMBG-1.4"), "briaai--RMBG-1.4");
    /// ```
    #[must_use]
    pub fn model_id_to_dir(model_id: &str) -> String {
        model_id.trim_matches('/').replace('/', "--")
    }

    /// Check whether a hub model is cached with usable weights
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        self.model_path(model_id)
            .is_ok_and(|path| Self::validate_model_directory(&path))
    }

    /// Path to the cached directory of a hub model (may not exist).
    /// Always a direct child of the cache directory.
    ///
    /// # Errors
    /// - Not an `owner/repo` identifier
    pub fn model_path(&self, model_id: &str) -> Result<PathBuf> {
        validate_model_id(model_id)?;
        Ok(self.cache_dir.join(Self::model_id_to_dir(model_id)))
    }

    /// Current cache directory
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Scan the cache directory and return every usable model
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgBlasterError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(info) = Self::analyze_model_directory(&path) {
                    models.push(info);
                }
            }
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove one cached model. Returns `false` when it was not cached.
    ///
    /// # Errors
    /// - Not an `owner/repo` identifier
    /// - Failed to remove the model directory
    pub fn clear_model(&self, model_id: &str) -> Result<bool> {
        let model_path = self.model_path(model_id)?;
        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_path).map_err(|e| {
            BgBlasterError::file_io_error("remove cached model", &model_path, &e)
        })?;
        Ok(true)
    }

    /// Remove every cached model, returning the removed directory names
    ///
    /// # Errors
    /// - Failed to read the cache directory or remove an entry
    pub fn clear_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgBlasterError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| {
                    BgBlasterError::file_io_error("remove cached model", &path, &e)
                })?;
                removed.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        removed.sort();
        Ok(removed)
    }

    fn validate_model_directory(model_path: &Path) -> bool {
        model_path.join("config.json").is_file()
            && ONNX_WEIGHT_FILES
                .iter()
                .any(|(file, _)| model_path.join(file).is_file())
    }

    fn analyze_model_directory(model_path: &Path) -> Option<CachedModelInfo> {
        if !Self::validate_model_directory(model_path) {
            log::debug!("Skipping invalid model directory: {}", model_path.display());
            return None;
        }

        let variants = ONNX_WEIGHT_FILES
            .iter()
            .filter(|(file, _)| model_path.join(file).is_file())
            .map(|(_, variant)| (*variant).to_string())
            .collect();

        Some(CachedModelInfo {
            model_id: model_path.file_name()?.to_string_lossy().to_string(),
            path: model_path.to_path_buf(),
            has_preprocessor: model_path.join("preprocessor_config.json").is_file(),
            variants,
            size_bytes: directory_size(model_path),
        })
    }
}

fn directory_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                directory_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.first().unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
