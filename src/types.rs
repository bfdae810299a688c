//! Core types shared by the model session, compositor and controller

use crate::error::{BgBlasterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// MIME type of every artifact this crate produces
pub const PNG_MIME: &str = "image/png";

/// A user-supplied image file: its name and undecoded bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// File name (final path component)
    pub name: String,
    /// Encoded image bytes (PNG, JPEG, TIFF, WebP)
    pub bytes: Vec<u8>,
}

impl SourceImage {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read an image file from disk
    ///
    /// # Errors
    /// - File cannot be read
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| BgBlasterError::file_io_error("read input image", path, &e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// An encoded artifact ready to be displayed or saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    /// Write the artifact into `dir` under its file name
    ///
    /// # Errors
    /// - File cannot be written
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)
            .map_err(|e| BgBlasterError::file_io_error("write artifact", &path, &e))?;
        Ok(path)
    }
}

/// Single-channel intensity values (0-255), one per pixel, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap intensity values of a `width` x `height` image
    ///
    /// # Errors
    /// - `data.len()` differs from `width * height`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(BgBlasterError::encoding(format!(
                "Pixel buffer holds {} values, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Buffer filled with one value
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Foreground/background split at the midpoint intensity
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }
}

/// Statistics about a predicted mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

/// Timing breakdown of one `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the source bytes
    pub decode_ms: u64,
    /// Resize, rescale and normalize into the input tensor
    pub preprocessing_ms: u64,
    /// Forward pass
    pub inference_ms: u64,
    /// Output scaling and resize back to source dimensions
    pub postprocessing_ms: u64,
    /// Compositing and PNG encoding of both artifacts
    pub encode_ms: u64,
    /// End-to-end
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent in the forward pass
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Preprocess: {}ms | Inference: {}ms ({:.0}%) | Postprocess: {}ms | Encode: {}ms",
            self.total_ms,
            self.decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.inference_ratio() * 100.0,
            self.postprocessing_ms,
            self.encode_ms
        )
    }
}

/// Both artifacts of a successful run. Never partial.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImages {
    /// Opaque grayscale visualization of the mask
    pub mask: EncodedImage,
    /// Source image with the mask as its alpha channel
    pub composite: EncodedImage,
    pub statistics: MaskStatistics,
    pub timings: ProcessingTimings,
}

/// The current image: a source plus, once processed, both artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: Uuid,
    pub source: SourceImage,
    pub selected_at: DateTime<Utc>,
    results: Option<ProcessedImages>,
}

impl ImageRecord {
    /// Fresh record for a newly selected file
    #[must_use]
    pub fn new(source: SourceImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            selected_at: Utc::now(),
            results: None,
        }
    }

    /// Attach the artifacts of a successful run; mask and composite are set together
    #[must_use]
    pub fn with_results(mut self, images: ProcessedImages) -> Self {
        self.results = Some(images);
        self
    }

    #[must_use]
    pub fn mask(&self) -> Option<&EncodedImage> {
        self.results.as_ref().map(|r| &r.mask)
    }

    #[must_use]
    pub fn composite(&self) -> Option<&EncodedImage> {
        self.results.as_ref().map(|r| &r.composite)
    }

    #[must_use]
    pub fn results(&self) -> Option<&ProcessedImages> {
        self.results.as_ref()
    }

    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.results.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(name: &str) -> EncodedImage {
        EncodedImage {
            file_name: name.to_string(),
            mime: PNG_MIME,
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_pixel_buffer_rejects_length_mismatch() {
        assert!(PixelBuffer::new(3, 2, vec![0; 6]).is_ok());
        let err = PixelBuffer::new(3, 2, vec![0; 5]).unwrap_err();
        assert!(matches!(err, BgBlasterError::Encoding(_)));
    }

    #[test]
    fn test_statistics() {
        let buffer = PixelBuffer::new(2, 2, vec![0, 128, 255, 127]).unwrap();
        let stats = buffer.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.background_pixels, 2);
        assert!((stats.foreground_ratio - 0.5).abs() < f32::EPSILON);

        assert_eq!(PixelBuffer::filled(0, 0, 0).statistics().foreground_ratio, 0.0);
    }

    #[test]
    fn test_record_sets_both_artifacts_at_once() {
        let record = ImageRecord::new(SourceImage::new("cat.png", vec![9]));
        assert!(!record.is_processed());
        assert!(record.mask().is_none() && record.composite().is_none());

        let record = record.with_results(ProcessedImages {
            mask: encoded("cat-mask.png"),
            composite: encoded("cat-bg-blasted.png"),
            statistics: PixelBuffer::filled(1, 1, 255).statistics(),
            timings: ProcessingTimings::default(),
        });
        assert_eq!(record.mask().unwrap().file_name, "cat-mask.png");
        assert_eq!(record.composite().unwrap().file_name, "cat-bg-blasted.png");
    }

    #[test]
    fn test_records_get_distinct_ids() {
        let a = ImageRecord::new(SourceImage::new("a.png", vec![]));
        let b = ImageRecord::new(SourceImage::new("a.png", vec![]));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_timings_summary() {
        let timings = ProcessingTimings {
            inference_ms: 50,
            total_ms: 100,
            ..ProcessingTimings::default()
        };
        assert!((timings.inference_ratio() - 0.5).abs() < f64::EPSILON);
        assert!(timings.summary().starts_with("Total: 100ms"));
        assert!(timings.summary().contains("Inference: 50ms (50%)"));
        assert_eq!(ProcessingTimings::default().inference_ratio(), 0.0);
    }

    #[test]
    fn test_source_and_artifact_io() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = encoded("x-mask.png").write_to_dir(dir.path()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let source = SourceImage::from_path(&path).unwrap();
        assert_eq!(source.name, "x-mask.png");
        assert!(SourceImage::from_path(&dir.path().join("missing.png")).is_err());
    }
}
