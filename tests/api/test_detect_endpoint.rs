// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upload endpoint tests for POST /upload and POST /v1/detect
//!
//! Requests go through the full router (body limit, CORS, tracing) via
//! `oneshot`, with stub detectors in place of the ONNX model.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use skyscan_node::api::{build_router, AppState, DETECTIONS_HEADER, IMAGE_ORIGIN_HEADER};
use skyscan_node::detection::{Detector, UnavailableDetector};
use skyscan_node::enhancement::{DisabledEnhancer, Enhancer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{
    dir_entries, jpeg_dimensions, pipeline_with, png_bytes, FailingDetector, Script,
    ScriptedEnhancer, StubDetector,
};

const BOUNDARY: &str = "skyscan-test-boundary";

fn router(enhancer: Arc<dyn Enhancer>, detector: Arc<dyn Detector>, work_dir: &Path) -> Router {
    let pipeline = pipeline_with(enhancer, detector, work_dir, Duration::from_secs(5));
    build_router(AppState::new(pipeline))
}

fn multipart_request(uri: &str, field: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"scene.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_upload_returns_annotated_jpeg() {
    let work = tempfile::tempdir().unwrap();
    let app = router(Arc::new(DisabledEnhancer), StubDetector::new(), work.path());

    let response = app
        .oneshot(multipart_request("/upload", "file", &png_bytes(64, 32)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[DETECTIONS_HEADER], "1");
    assert_eq!(response.headers()[IMAGE_ORIGIN_HEADER], "original");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(jpeg_dimensions(&body), (64, 32));
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_v1_detect_accepts_image_field_and_uses_enhancement() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(
        Script::Upscale {
            width: 128,
            height: 64,
        },
        work.path(),
    );
    let app = router(enhancer, StubDetector::new(), work.path());

    let response = app
        .oneshot(multipart_request("/v1/detect", "image", &png_bytes(64, 32)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[IMAGE_ORIGIN_HEADER], "enhanced");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(jpeg_dimensions(&body), (128, 64));
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_quota_exhaustion_is_invisible_to_caller() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(
        Script::Fail("429: quota exceeded for this API key".to_string()),
        work.path(),
    );
    let app = router(enhancer, StubDetector::new(), work.path());

    let response = app
        .oneshot(multipart_request("/upload", "file", &png_bytes(30, 30)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[IMAGE_ORIGIN_HEADER], "original");
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let work = tempfile::tempdir().unwrap();
    let app = router(Arc::new(DisabledEnhancer), StubDetector::new(), work.path());

    let response = app
        .oneshot(multipart_request("/upload", "attachment", &png_bytes(8, 8)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["errorType"], "invalid_upload");
    assert!(json["requestId"].is_string());
}

#[tokio::test]
async fn test_non_multipart_request_is_bad_request() {
    let work = tempfile::tempdir().unwrap();
    let app = router(Arc::new(DisabledEnhancer), StubDetector::new(), work.path());

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["errorType"], "invalid_upload");
}

#[tokio::test]
async fn test_undecodable_image_is_bad_request() {
    let work = tempfile::tempdir().unwrap();
    let app = router(Arc::new(DisabledEnhancer), StubDetector::new(), work.path());

    let response = app
        .oneshot(multipart_request("/upload", "file", b"plain text, not pixels"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        Arc::new(DisabledEnhancer),
        StubDetector::new(),
        work.path(),
        Duration::from_secs(5),
    )
    .with_max_upload_bytes(1024);
    let app = build_router(AppState::new(pipeline));

    let response = app
        .oneshot(multipart_request("/upload", "file", &vec![0u8; 256 * 1024]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["errorType"], "payload_too_large");
}

#[tokio::test]
async fn test_detector_failure_returns_json_error_and_cleans_up() {
    let work = tempfile::tempdir().unwrap();
    let app = router(Arc::new(DisabledEnhancer), Arc::new(FailingDetector), work.path());

    let response = app
        .oneshot(multipart_request("/upload", "file", &png_bytes(16, 16)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["errorType"], "internal_error");
    assert!(json["message"].as_str().unwrap().contains("scripted inference failure"));
    assert_eq!(dir_entries(work.path()), 0);
}

#[tokio::test]
async fn test_unloaded_model_is_service_unavailable() {
    let work = tempfile::tempdir().unwrap();
    let app = router(
        Arc::new(DisabledEnhancer),
        Arc::new(UnavailableDetector::new("yolov8n-obb", "weights missing")),
        work.path(),
    );

    let response = app
        .oneshot(multipart_request("/v1/detect", "file", &png_bytes(16, 16)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["errorType"], "service_unavailable");
}
