//! End-to-end session runs with a stub model in place of RMBG-1.4

mod common;

use bg_blaster::{BgBlasterError, MattingSession};
use common::{
    decode, gradient_rgb, jpeg_with_orientation, local_model, png_source, solid_rgb,
    stub_session, StubBackend,
};

#[tokio::test]
async fn test_full_foreground_keeps_source() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(1.0));
    assert!(session.initialize().await.unwrap());

    let source = solid_rgb(10, 10, [255, 255, 255]);
    let images = session.run(&png_source("white.png", &source)).await.unwrap();

    let mask = decode(&images.mask.bytes);
    assert_eq!(mask.dimensions(), (10, 10));
    assert!(mask.pixels().all(|p| p.0 == [255, 255, 255, 255]));

    let composite = decode(&images.composite.bytes);
    assert_eq!(composite, source.to_rgba8());
    assert!((images.statistics.foreground_ratio - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_full_background_clears_alpha_only() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(0.0));
    session.initialize().await.unwrap();

    let source = gradient_rgb(12, 8);
    let images = session.run(&png_source("grad.png", &source)).await.unwrap();

    let mask = decode(&images.mask.bytes);
    assert!(mask.pixels().all(|p| p.0 == [0, 0, 0, 255]));

    let composite = decode(&images.composite.bytes);
    let rgba = source.to_rgba8();
    for (out, src) in composite.pixels().zip(rgba.pixels()) {
        assert_eq!(out.0[3], 0);
        assert_eq!(out.0[..3], src.0[..3]);
    }
    assert_eq!(images.statistics.foreground_pixels, 0);
}

#[tokio::test]
async fn test_output_resized_to_source_dimensions() {
    let dir = local_model();
    let mut backend = StubBackend::constant(1.0);
    backend.output_size = (7, 5);
    let mut session = stub_session(&dir, backend);
    session.initialize().await.unwrap();

    let images = session
        .run(&png_source("wide.png", &solid_rgb(40, 20, [1, 2, 3])))
        .await
        .unwrap();
    assert_eq!(decode(&images.mask.bytes).dimensions(), (40, 20));
    assert_eq!(decode(&images.composite.bytes).dimensions(), (40, 20));
}

#[tokio::test]
async fn test_exif_orientation_is_applied() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(1.0));
    session.initialize().await.unwrap();

    let landscape = solid_rgb(40, 20, [120, 120, 120]);
    let rotated = bg_blaster::SourceImage::new("phone.jpg", jpeg_with_orientation(&landscape, 6));
    let images = session.run(&rotated).await.unwrap();
    assert_eq!(decode(&images.mask.bytes).dimensions(), (20, 40));
    assert_eq!(decode(&images.composite.bytes).dimensions(), (20, 40));

    let upright = bg_blaster::SourceImage::new("plain.jpg", jpeg_with_orientation(&landscape, 1));
    let images = session.run(&upright).await.unwrap();
    assert_eq!(decode(&images.mask.bytes).dimensions(), (40, 20));
}

#[tokio::test]
async fn test_artifact_names_follow_source() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(1.0));
    session.initialize().await.unwrap();

    let images = session
        .run(&png_source("my.cat.png", &solid_rgb(4, 4, [9, 9, 9])))
        .await
        .unwrap();
    assert_eq!(images.mask.file_name, "my-mask.png");
    assert_eq!(images.composite.file_name, "my-bg-blasted.png");
    assert_eq!(images.mask.mime, "image/png");
}

#[tokio::test]
async fn test_run_before_initialize() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(1.0));

    let result = session
        .run(&png_source("cat.png", &solid_rgb(4, 4, [0, 0, 0])))
        .await;
    assert!(matches!(result, Err(BgBlasterError::NotInitialized)));
}

#[tokio::test]
async fn test_initialize_failure_is_model_init() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::failing_init());

    let result = session.initialize().await;
    assert!(matches!(result, Err(BgBlasterError::ModelInit(_))));
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn test_inference_failure_leaves_session_usable() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::failing_inference());
    session.initialize().await.unwrap();

    let source = png_source("cat.png", &solid_rgb(4, 4, [0, 0, 0]));
    let first = session.run(&source).await;
    assert!(matches!(first, Err(BgBlasterError::Inference(_))));
    assert!(session.is_loaded());

    let second = session.run(&source).await;
    assert!(matches!(second, Err(BgBlasterError::Inference(_))));
}

#[tokio::test]
async fn test_undecodable_source_is_inference_error() {
    let dir = local_model();
    let mut session = stub_session(&dir, StubBackend::constant(1.0));
    session.initialize().await.unwrap();

    let result = session
        .run(&bg_blaster::SourceImage::new("notes.txt", b"not an image".to_vec()))
        .await;
    assert!(matches!(result, Err(BgBlasterError::Inference(_))));
}
