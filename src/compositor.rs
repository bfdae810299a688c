//! Compositing of a source bitmap with a predicted mask
//!
//! Produces the two PNG artifacts of a run: an opaque grayscale view of the
//! mask, and the source image with the mask written into its alpha channel.

use crate::error::{BgBlasterError, Result};
use crate::types::{EncodedImage, PixelBuffer, ProcessedImages, ProcessingTimings, PNG_MIME};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use instant::Instant;
use std::io::Cursor;
use std::path::Path;

/// Suffix of the mask artifact
pub const MASK_SUFFIX: &str = "-mask.png";

/// Suffix of the composite artifact
pub const COMPOSITE_SUFFIX: &str = "-bg-blasted.png";

/// Base name used for artifacts: the final path component cut at its first `.`.
/// Names starting with a `.` keep the whole file name.
///
/// ```
/// use bg_blaster::compositor::artifact_basename;
///
/// assert_eq!(artifact_basename("cat.png"), "cat");
/// assert_eq!(artifact_basename("my.cat.png"), "my");
/// assert_eq!(artifact_basename(".hidden.png"), ".hidden.png");
/// ```
#[must_use]
pub fn artifact_basename(source_name: &str) -> &str {
    let file_name = Path::new(source_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source_name);
    match file_name.split('.').next() {
        Some(base) if !base.is_empty() => base,
        _ => file_name,
    }
}

/// File names of the mask and composite artifacts for a source file
#[must_use]
pub fn artifact_names(source_name: &str) -> (String, String) {
    let base = artifact_basename(source_name);
    (format!("{base}{MASK_SUFFIX}"), format!("{base}{COMPOSITE_SUFFIX}"))
}

fn check_surface(width: u32, height: u32, buffer: &PixelBuffer) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(BgBlasterError::encoding(format!(
            "Cannot create a {width}x{height} drawing surface"
        )));
    }
    if buffer.dimensions() != (width, height) {
        let (bw, bh) = buffer.dimensions();
        return Err(BgBlasterError::encoding(format!(
            "Mask is {bw}x{bh} but the image is {width}x{height}"
        )));
    }
    Ok(())
}

/// Opaque grayscale visualization: R=G=B=`buffer[i]`, A=255
///
/// # Errors
/// - Zero-sized buffer
pub fn mask_image(buffer: &PixelBuffer) -> Result<RgbaImage> {
    let (width, height) = buffer.dimensions();
    check_surface(width, height, buffer)?;

    let mut surface = RgbaImage::new(width, height);
    for (pixel, &value) in surface.pixels_mut().zip(buffer.as_slice()) {
        *pixel = Rgba([value, value, value, 255]);
    }
    Ok(surface)
}

/// The source copied verbatim with its alpha channel replaced by `buffer[i]`
///
/// # Errors
/// - Zero-sized source or buffer of different dimensions
pub fn composite_image(source: &DynamicImage, buffer: &PixelBuffer) -> Result<RgbaImage> {
    check_surface(source.width(), source.height(), buffer)?;

    let mut surface = source.to_rgba8();
    for (pixel, &alpha) in surface.pixels_mut().zip(buffer.as_slice()) {
        pixel.0[3] = alpha;
    }
    Ok(surface)
}

/// Encode a surface as PNG
///
/// # Errors
/// - PNG encoder failure
pub fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    surface
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| BgBlasterError::encoding(format!("PNG encoding failed: {e}")))?;
    Ok(bytes)
}

/// Build both artifacts for a source image. Either both are returned or the call fails.
///
/// # Errors
/// - `Encoding` when a surface cannot be created or PNG encoding fails
pub fn compose(
    source: &DynamicImage,
    source_name: &str,
    buffer: &PixelBuffer,
) -> Result<ProcessedImages> {
    let encode_start = Instant::now();
    let (mask_name, composite_name) = artifact_names(source_name);

    let mask = encode_png(&mask_image(buffer)?)?;
    let composite = encode_png(&composite_image(source, buffer)?)?;

    Ok(ProcessedImages {
        mask: EncodedImage {
            file_name: mask_name,
            mime: PNG_MIME,
            bytes: mask,
        },
        composite: EncodedImage {
            file_name: composite_name,
            mime: PNG_MIME,
            bytes: composite,
        },
        statistics: buffer.statistics(),
        timings: ProcessingTimings {
            encode_ms: encode_start.elapsed().as_millis() as u64,
            ..ProcessingTimings::default()
        },
    })
}
