// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline orchestrator tests
//!
//! Covers the end-to-end contract: a decodable JPEG whenever the detector
//! succeeds, whatever the enhancer does, and no upload left on disk.

use skyscan_node::detection::{DetectionError, UnavailableDetector};
use skyscan_node::enhancement::{DisabledEnhancer, ImageOrigin};
use image::ImageFormat;
use skyscan_node::imaging::{Dimensions, MAX_IMAGE_SIZE};
use skyscan_node::pipeline::{PipelineError, UploadError};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{
    dir_entries, encode, jpeg_dimensions, pipeline_with, png_bytes, FailingDetector, Script,
    ScriptedEnhancer, StubDetector, test_image,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_returns_jpeg_for_every_enhancer_outcome() {
    let scripts = vec![
        Script::Upscale {
            width: 128,
            height: 96,
        },
        Script::Upscale {
            width: 32,
            height: 32,
        },
        Script::Fail("Quota exceeded for model real-esrgan".to_string()),
        Script::Fail("connection reset by peer".to_string()),
        Script::Panic,
        Script::MissingFile,
        Script::Corrupt,
    ];

    for script in scripts {
        let work = tempfile::tempdir().unwrap();
        let enhancer = ScriptedEnhancer::new(script.clone(), work.path());
        let pipeline = pipeline_with(enhancer, StubDetector::new(), work.path(), TIMEOUT);

        let output = pipeline
            .run(png_bytes(64, 48))
            .await
            .unwrap_or_else(|e| panic!("{:?} failed: {}", script, e));

        assert_eq!(output.content_type, "image/jpeg");
        let expected = match script {
            Script::Upscale { width: 128, .. } => (128, 96),
            _ => (64, 48),
        };
        assert_eq!(jpeg_dimensions(&output.jpeg), expected, "{:?}", script);
        assert_eq!(dir_entries(work.path()), 0, "{:?} left files behind", script);
    }
}

#[tokio::test]
async fn test_enhanced_image_reaches_detector() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(
        Script::Upscale {
            width: 128,
            height: 96,
        },
        work.path(),
    );
    let detector = StubDetector::new();
    let pipeline = pipeline_with(enhancer.clone(), detector.clone(), work.path(), TIMEOUT);

    let output = pipeline.run(png_bytes(64, 48)).await.unwrap();

    assert_eq!(output.origin, ImageOrigin::Enhanced);
    assert_eq!(output.dimensions, Dimensions::new(128, 96));
    assert_eq!(output.detection_count(), 1);
    assert_eq!(detector.seen(), vec![Dimensions::new(128, 96)]);
    assert!(enhancer.saw_input_file());
}

#[tokio::test]
async fn test_detector_failure_is_fatal_and_cleans_up() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(Script::Fail("down".to_string()), work.path());
    let pipeline = pipeline_with(enhancer.clone(), Arc::new(FailingDetector), work.path(), TIMEOUT);

    let err = pipeline.run(png_bytes(40, 30)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Detection(DetectionError::Inference(_))
    ));
    assert!(enhancer.saw_input_file());
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_unloaded_model_reports_unavailable() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        Arc::new(DisabledEnhancer),
        Arc::new(UnavailableDetector::new("yolov8n-obb", "weights missing")),
        work.path(),
        TIMEOUT,
    );

    let err = pipeline.run(png_bytes(16, 16)).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Detection(DetectionError::ModelUnavailable(_))
    ));
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_same_upload_renders_identically_with_failing_enhancer() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(Script::Fail("quota".to_string()), work.path());
    let pipeline = pipeline_with(enhancer, StubDetector::new(), work.path(), TIMEOUT);
    let upload = png_bytes(80, 60);

    let first = pipeline.run(upload.clone()).await.unwrap();
    let second = pipeline.run(upload).await.unwrap();

    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.jpeg, second.jpeg);
}

#[tokio::test]
async fn test_cancelled_request_removes_upload() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(Script::Hang, work.path());
    let pipeline = pipeline_with(
        enhancer.clone(),
        StubDetector::new(),
        work.path(),
        Duration::from_secs(3600),
    );

    let result = tokio::time::timeout(Duration::from_millis(200), pipeline.run(png_bytes(20, 20))).await;

    assert!(result.is_err(), "request should still be waiting on the enhancer");
    assert_eq!(enhancer.calls(), 1);
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected_before_persisting() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(Script::Fail("unused".to_string()), work.path());
    let pipeline = pipeline_with(enhancer.clone(), StubDetector::new(), work.path(), TIMEOUT);

    let err = pipeline
        .run(bytes::Bytes::from_static(b"GIF89a but truncated"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Upload(UploadError::InvalidImage(_))));

    let err = pipeline.run(bytes::Bytes::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Upload(UploadError::Empty)));

    assert_eq!(enhancer.calls(), 0);
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_configured_upload_limit_above_default_is_honoured() {
    let work = tempfile::tempdir().unwrap();
    let upload = bytes::Bytes::from(encode(&test_image(2700, 2700), ImageFormat::Bmp));
    assert!(upload.len() > MAX_IMAGE_SIZE);

    let pipeline = pipeline_with(
        Arc::new(DisabledEnhancer),
        StubDetector::new(),
        work.path(),
        TIMEOUT,
    )
    .with_max_upload_bytes(64 * 1024 * 1024);

    let output = pipeline.run(upload.clone()).await.unwrap();
    assert_eq!(output.dimensions, Dimensions::new(2700, 2700));
    assert_eq!(dir_entries(work.path()), 0);

    let strict = pipeline_with(
        Arc::new(DisabledEnhancer),
        StubDetector::new(),
        work.path(),
        TIMEOUT,
    )
    .with_max_upload_bytes(MAX_IMAGE_SIZE);
    let err = strict.run(upload).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Upload(UploadError::TooLarge { limit, .. }) if limit == MAX_IMAGE_SIZE
    ));
}
