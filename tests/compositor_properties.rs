//! Properties of the compositor over arbitrary pixel buffers

mod common;

use bg_blaster::compositor::{artifact_basename, compose, composite_image, mask_image};
use bg_blaster::PixelBuffer;
use common::{decode, gradient_rgb, solid_rgb};

fn ramp(width: u32, height: u32) -> PixelBuffer {
    let data = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
    PixelBuffer::new(width, height, data).unwrap()
}

#[test]
fn test_mask_mirrors_buffer() {
    let buffer = ramp(9, 5);
    let mask = mask_image(&buffer).unwrap();

    assert_eq!(mask.dimensions(), (9, 5));
    for (pixel, value) in mask.pixels().zip(buffer.as_slice()) {
        assert_eq!(pixel.0, [*value, *value, *value, 255]);
    }
}

#[test]
fn test_composite_applies_buffer_as_alpha() {
    let source = gradient_rgb(9, 5);
    let buffer = ramp(9, 5);
    let composite = composite_image(&source, &buffer).unwrap();

    let rgba = source.to_rgba8();
    for ((out, src), value) in composite.pixels().zip(rgba.pixels()).zip(buffer.as_slice()) {
        assert_eq!(out.0[..3], src.0[..3]);
        assert_eq!(out.0[3], *value);
    }
}

#[test]
fn test_encoded_artifacts_decode_to_surfaces() {
    let source = gradient_rgb(16, 16);
    let buffer = ramp(16, 16);
    let images = compose(&source, "photo.jpeg", &buffer).unwrap();

    assert_eq!(decode(&images.mask.bytes), mask_image(&buffer).unwrap());
    assert_eq!(
        decode(&images.composite.bytes),
        composite_image(&source, &buffer).unwrap()
    );
    assert_eq!(images.statistics.total_pixels, 256);
}

#[test]
fn test_compose_is_deterministic() {
    let source = gradient_rgb(20, 11);
    let buffer = ramp(20, 11);

    let first = compose(&source, "cat.png", &buffer).unwrap();
    let second = compose(&source, "cat.png", &buffer).unwrap();
    assert_eq!(first.mask.bytes, second.mask.bytes);
    assert_eq!(first.composite.bytes, second.composite.bytes);
}

#[test]
fn test_dimension_mismatch_rejected() {
    let source = solid_rgb(4, 4, [0, 0, 0]);
    assert!(composite_image(&source, &ramp(4, 5)).is_err());
}

#[test]
fn test_basename_edge_cases() {
    assert_eq!(artifact_basename("cat.png"), "cat");
    assert_eq!(artifact_basename("my.cat.png"), "my");
    assert_eq!(artifact_basename("noext"), "noext");
    assert_eq!(artifact_basename("dir/sub/dog.webp"), "dog");
    assert_eq!(artifact_basename(".hidden.png"), ".hidden.png");
    assert_eq!(
        bg_blaster::artifact_names(".hidden.png").0,
        ".hidden.png-mask.png"
    );
}
