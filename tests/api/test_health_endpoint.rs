// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Root and health endpoint tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use skyscan_node::api::{build_router, AppState};
use skyscan_node::detection::UnavailableDetector;
use skyscan_node::enhancement::DisabledEnhancer;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{pipeline_with, Script, ScriptedEnhancer, StubDetector};

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_root_welcome_message() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        Arc::new(DisabledEnhancer),
        StubDetector::new(),
        work.path(),
        Duration::from_secs(1),
    );

    let (status, json) = get_json(build_router(AppState::new(pipeline)), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Welcome to the skyscan detection node");
}

#[tokio::test]
async fn test_health_reports_components() {
    let work = tempfile::tempdir().unwrap();
    let enhancer = ScriptedEnhancer::new(Script::Fail("unused".to_string()), work.path());
    let pipeline = pipeline_with(enhancer, StubDetector::new(), work.path(), Duration::from_secs(1));

    let (status, json) = get_json(build_router(AppState::new(pipeline)), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["detector"]["name"], "stub-obb");
    assert_eq!(json["detector"]["ready"], true);
    assert_eq!(json["enhancer"]["name"], "scripted");
    assert_eq!(json["enhancer"]["configured"], true);
}

#[tokio::test]
async fn test_health_degraded_without_model() {
    let work = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(
        Arc::new(DisabledEnhancer),
        Arc::new(UnavailableDetector::new("yolov8n-obb", "weights missing")),
        work.path(),
        Duration::from_secs(1),
    );

    let (status, json) = get_json(build_router(AppState::new(pipeline)), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["detector"]["ready"], false);
    assert_eq!(json["enhancer"]["configured"], false);
    assert_eq!(json["enhancer"]["name"], "disabled");
}
