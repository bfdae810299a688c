//! The model's image processor
//!
//! Turns a decoded bitmap into the model's NCHW input tensor, and the model's
//! single-channel output tensor back into a pixel buffer at source size.

use crate::error::{BgBlasterError, Result};
use crate::inference::validate_output_shape;
use crate::models::PreprocessingConfig;
use crate::types::PixelBuffer;
use image::{imageops, DynamicImage, GrayImage};
use ndarray::Array4;

/// Image processor with fixed pre/post-processing parameters
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    config: PreprocessingConfig,
}

impl ImageProcessor {
    #[must_use]
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Resize (stretch, no padding), rescale and normalize into a `1x3xHxW` tensor
    ///
    /// # Errors
    /// - Empty source bitmap
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BgBlasterError::inference("Cannot preprocess an empty image"));
        }

        let rgb = image.to_rgb8();
        let rgb = if self.config.do_resize {
            imageops::resize(
                &rgb,
                self.config.size.width,
                self.config.size.height,
                self.config.resample.filter(),
            )
        } else {
            rgb
        };

        let (width, height) = rgb.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            for (c, &channel) in pixel.0.iter().enumerate() {
                let mut value = f32::from(channel);
                if self.config.do_rescale {
                    value *= self.config.rescale_factor;
                }
                if self.config.do_normalize {
                    let mean = self.config.image_mean.get(c).copied().unwrap_or(0.0);
                    let std = self.config.image_std.get(c).copied().unwrap_or(1.0);
                    value = (value - mean) / std;
                }
                if let Some(slot) = tensor.get_mut([0, c, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        Ok(tensor)
    }

    /// Scale a `1x1xHxW` output (range 0..1) to 0..255 and resize it bilinearly
    /// to the source dimensions
    ///
    /// # Errors
    /// - Output tensor is not single-channel 4D
    /// - Target dimensions are zero
    pub fn postprocess(&self, output: &Array4<f32>, target: (u32, u32)) -> Result<PixelBuffer> {
        let (height, width) = validate_output_shape(output)?;
        let (target_width, target_height) = target;
        if target_width == 0 || target_height == 0 {
            return Err(BgBlasterError::inference(format!(
                "Invalid target dimensions {target_width}x{target_height}"
            )));
        }

        let values: Vec<u8> = output
            .iter()
            .map(|&v| (v * 255.0).clamp(0.0, 255.0) as u8)
            .collect();
        let mask = GrayImage::from_raw(width as u32, height as u32, values)
            .ok_or_else(|| BgBlasterError::inference("Failed to create mask from output tensor"))?;

        let mask = if mask.dimensions() == target {
            mask
        } else {
            imageops::resize(
                &mask,
                target_width,
                target_height,
                imageops::FilterType::Triangle,
            )
        };

        PixelBuffer::new(target_width, target_height, mask.into_raw())
            .map_err(|e| BgBlasterError::inference(e.to_string()))
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(PreprocessingConfig::rmbg())
    }
}
