//! Model identification and processor parameters

use crate::error::{BgBlasterError, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pretrained matting model used when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "briaai/RMBG-1.4";

/// Side length of the square input the model expects
pub const MODEL_INPUT_SIZE: u32 = 1024;

/// ONNX weight files probed inside a model directory, in preference order
pub const ONNX_WEIGHT_FILES: &[(&str, &str)] = &[
    ("onnx/model.onnx", "fp32"),
    ("onnx/model_fp16.onnx", "fp16"),
    ("onnx/model_quantized.onnx", "quantized"),
];

/// Where the model files come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Model repository on the hub, e.g. `briaai/RMBG-1.4`
    Hub(String),
    /// Local directory laid out like a hub repository
    Local(PathBuf),
}

impl ModelSource {
    /// Resolve a model identifier.
    ///
    /// Local directories are only considered when `allow_local_models` is set;
    /// otherwise every identifier is treated as a hub repository.
    #[must_use]
    pub fn resolve(model_id: &str, allow_local_models: bool) -> Self {
        if allow_local_models {
            let path = Path::new(model_id);
            if path.is_dir() {
                return Self::Local(path.to_path_buf());
            }
        }
        Self::Hub(model_id.to_string())
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Hub(model_id) => format!("hub:{model_id}"),
            Self::Local(path) => format!(
                "local:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Resampling filter used by the processor's fixed-size resize.
///
/// Numbering follows the PIL convention used by hub `preprocessor_config.json` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Resample {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl Resample {
    #[must_use]
    pub fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl From<u8> for Resample {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Nearest,
            1 => Self::Lanczos,
            3 => Self::Bicubic,
            _ => Self::Bilinear,
        }
    }
}

impl From<Resample> for u8 {
    fn from(value: Resample) -> Self {
        match value {
            Resample::Nearest => 0,
            Resample::Lanczos => 1,
            Resample::Bilinear => 2,
            Resample::Bicubic => 3,
        }
    }
}

/// Target size of the processor's resize step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSize {
    pub width: u32,
    pub height: u32,
}

/// Pre/post-processing parameters of the model's image processor.
///
/// Field names mirror hub `preprocessor_config.json` files so a downloaded
/// config can be parsed directly; the session still applies its own fixed
/// values on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    #[serde(default = "default_true")]
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_resize: bool,
    pub size: ProcessorSize,
    #[serde(default = "default_resample")]
    pub resample: Resample,
}

fn default_true() -> bool {
    true
}

fn default_resample() -> Resample {
    Resample::Bilinear
}

impl PreprocessingConfig {
    /// The fixed processor parameters for RMBG-1.4
    #[must_use]
    pub fn rmbg() -> Self {
        Self {
            do_normalize: true,
            image_mean: [0.5, 0.5, 0.5],
            image_std: [1.0, 1.0, 1.0],
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_resize: true,
            size: ProcessorSize {
                width: MODEL_INPUT_SIZE,
                height: MODEL_INPUT_SIZE,
            },
            resample: Resample::Bilinear,
        }
    }

    /// Parse a hub `preprocessor_config.json`
    ///
    /// # Errors
    /// - Malformed JSON or missing required fields
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            BgBlasterError::model_init(format!("Failed to parse preprocessor_config.json: {e}"))
        })
    }

    /// Validate the parameters before they are used to build tensors
    ///
    /// # Errors
    /// - Zero target size, non-positive std or rescale factor
    pub fn validate(&self) -> Result<()> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(BgBlasterError::invalid_config(format!(
                "Processor size must be non-zero, got {}x{}",
                self.size.width, self.size.height
            )));
        }
        if self.image_std.iter().any(|&s| s <= 0.0) {
            return Err(BgBlasterError::invalid_config(
                "Normalization std values must be positive",
            ));
        }
        if self.rescale_factor <= 0.0 {
            return Err(BgBlasterError::invalid_config(
                "Rescale factor must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self::rmbg()
    }
}

/// Files of a resolved model on disk
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Root directory of the model repository
    pub root: PathBuf,
    /// Selected ONNX weight file
    pub weights: PathBuf,
    /// Variant of the selected weights (fp32, fp16, quantized)
    pub variant: String,
}

impl ModelFiles {
    /// Locate the preferred ONNX weights in a model directory
    ///
    /// # Errors
    /// - No known ONNX weight file present
    pub fn locate(root: &Path) -> Result<Self> {
        ONNX_WEIGHT_FILES
            .iter()
            .map(|(file, variant)| (root.join(file), *variant))
            .find(|(path, _)| path.is_file())
            .map(|(weights, variant)| Self {
                root: root.to_path_buf(),
                weights,
                variant: variant.to_string(),
            })
            .ok_or_else(|| {
                BgBlasterError::model_init(format!(
                    "No ONNX weights found under {}",
                    root.join("onnx").display()
                ))
            })
    }

    /// Read the selected weights into memory
    ///
    /// # Errors
    /// - File I/O errors when reading the weights
    pub fn read_weights(&self) -> Result<Vec<u8>> {
        fs::read(&self.weights)
            .map_err(|e| BgBlasterError::file_io_error("read model weights", &self.weights, &e))
    }

    /// Read `preprocessor_config.json` if the repository ships one
    #[must_use]
    pub fn preprocessor_config(&self) -> Option<PreprocessingConfig> {
        let path = self.root.join("preprocessor_config.json");
        let content = fs::read_to_string(&path).ok()?;
        match PreprocessingConfig::from_json(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {}", path.display(), e);
                None
            },
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub variant: String,
    pub size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rmbg_parameters() {
        let config = PreprocessingConfig::rmbg();
        assert_eq!(config.image_mean, [0.5, 0.5, 0.5]);
        assert_eq!(config.image_std, [1.0, 1.0, 1.0]);
        assert!((config.rescale_factor - 1.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(config.size, ProcessorSize { width: 1024, height: 1024 });
        assert_eq!(config.resample, Resample::Bilinear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hub_preprocessor_config() {
        let json = r#"{
            "do_normalize": true,
            "do_pad": false,
            "do_rescale": true,
            "do_resize": true,
            "image_mean": [0.5, 0.5, 0.5],
            "feature_extractor_type": "ImageFeatureExtractor",
            "image_std": [1, 1, 1],
            "resample": 2,
            "rescale_factor": 0.00392156862745098,
            "size": { "width": 1024, "height": 1024 }
        }"#;
        let config = PreprocessingConfig::from_json(json).unwrap();
        assert_eq!(config.resample, Resample::Bilinear);
        assert_eq!(config.size.width, 1024);
        assert_eq!(config.image_std, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_parse_rejects_incomplete_config() {
        let err = PreprocessingConfig::from_json(r#"{"image_mean": [0.5, 0.5, 0.5]}"#).unwrap_err();
        assert!(matches!(err, BgBlasterError::ModelInit(_)));
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let mut config = PreprocessingConfig::rmbg();
        config.size.width = 0;
        assert!(config.validate().is_err());

        let mut config = PreprocessingConfig::rmbg();
        config.image_std = [1.0, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resample_pil_numbering() {
        assert_eq!(Resample::from(0), Resample::Nearest);
        assert_eq!(Resample::from(2), Resample::Bilinear);
        assert_eq!(u8::from(Resample::Bicubic), 3);
    }

    #[test]
    fn test_source_resolution_respects_local_flag() {
        let dir = TempDir::new().unwrap();
        let id = dir.path().to_string_lossy().to_string();

        assert_eq!(ModelSource::resolve(&id, false), ModelSource::Hub(id.clone()));
        assert_eq!(
            ModelSource::resolve(&id, true),
            ModelSource::Local(dir.path().to_path_buf())
        );
        assert_eq!(
            ModelSource::resolve(DEFAULT_MODEL_ID, true),
            ModelSource::Hub(DEFAULT_MODEL_ID.to_string())
        );
    }

    #[test]
    fn test_locate_prefers_fp32_weights() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("onnx")).unwrap();
        fs::write(dir.path().join("onnx/model_quantized.onnx"), b"q").unwrap();
        fs::write(dir.path().join("onnx/model.onnx"), b"full").unwrap();

        let files = ModelFiles::locate(dir.path()).unwrap();
        assert_eq!(files.variant, "fp32");
        assert_eq!(files.read_weights().unwrap(), b"full");
    }

    #[test]
    fn test_locate_without_weights_is_model_init_error() {
        let dir = TempDir::new().unwrap();
        let err = ModelFiles::locate(dir.path()).unwrap_err();
        assert!(matches!(err, BgBlasterError::ModelInit(_)));
    }
}
