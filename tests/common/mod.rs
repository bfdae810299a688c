//! Shared helpers for integration tests: a stub inference backend, its
//! factory, and in-memory images.

#![allow(dead_code)]

use bg_blaster::{
    BackendFactory, BackendType, BgBlasterError, InferenceBackend, ModelSession, Result,
    SessionConfig, SourceImage,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Backend producing a constant `1x1xHxW` output
#[derive(Debug, Clone)]
pub struct StubBackend {
    pub value: f32,
    pub output_size: (usize, usize),
    pub fail_init: bool,
    pub fail_inference: bool,
    initialized: bool,
}

impl StubBackend {
    pub fn constant(value: f32) -> Self {
        Self {
            value,
            output_size: (32, 32),
            fail_init: false,
            fail_inference: false,
            initialized: false,
        }
    }

    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::constant(1.0)
        }
    }

    pub fn failing_inference() -> Self {
        Self {
            fail_inference: true,
            ..Self::constant(1.0)
        }
    }
}

impl InferenceBackend for StubBackend {
    fn initialize(&mut self, _model: &[u8], _config: &SessionConfig) -> Result<Duration> {
        if self.fail_init {
            return Err(BgBlasterError::model_init("stub refused to load"));
        }
        self.initialized = true;
        Ok(Duration::from_millis(1))
    }

    fn infer(&mut self, _input: &Array4<f32>) -> Result<Array4<f32>> {
        if self.fail_inference {
            return Err(BgBlasterError::inference("stub forward pass failed"));
        }
        let (h, w) = self.output_size;
        Ok(Array4::from_elem((1, 1, h, w), self.value))
    }

    fn name(&self) -> &'static str {
        "stub"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

pub struct StubFactory {
    template: StubBackend,
}

impl BackendFactory for StubFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.template.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Tract]
    }
}

/// A model directory holding placeholder weights; the stub never parses them
pub fn local_model() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("onnx")).unwrap();
    std::fs::write(dir.path().join("onnx/model.onnx"), b"weights").unwrap();
    dir
}

pub fn stub_session(dir: &TempDir, backend: StubBackend) -> ModelSession {
    let config = SessionConfig::builder()
        .model_id(dir.path().to_string_lossy())
        .allow_local_models(true)
        .build()
        .unwrap();
    ModelSession::with_factory(config, Arc::new(StubFactory { template: backend })).unwrap()
}

pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Source image with a horizontal gradient so channel mix-ups show
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 77])
    }))
}

pub fn png_source(name: &str, image: &DynamicImage) -> SourceImage {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    SourceImage::new(name, bytes)
}

pub fn decode(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

/// JPEG bytes carrying an EXIF orientation tag (6 = rotate 90° clockwise)
pub fn jpeg_with_orientation(image: &DynamicImage, orientation: u16) -> Vec<u8> {
    let mut jpeg = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .unwrap();

    // Little-endian TIFF header with a single IFD entry: Orientation (0x0112), SHORT
    let mut tiff = b"II*\0".to_vec();
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let mut app1 = vec![0xFF, 0xE1];
    let length = (2 + 6 + tiff.len()) as u16;
    app1.extend_from_slice(&length.to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    // Right after the SOI marker
    let mut bytes = jpeg[..2].to_vec();
    bytes.extend_from_slice(&app1);
    bytes.extend_from_slice(&jpeg[2..]);
    bytes
}
