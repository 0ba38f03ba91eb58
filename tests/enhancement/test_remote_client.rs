// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Remote enhancer client tests against a mock upscaling sidecar

use base64::{engine::general_purpose::STANDARD, Engine as _};
use httpmock::prelude::*;
use image::ImageFormat;
use serde_json::json;
use skyscan_node::enhancement::{EnhanceError, EnhanceScale, Enhancer, RemoteEnhancerClient};
use skyscan_node::imaging::read_dimensions;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use crate::common::{dir_entries, encode, test_image};

struct Setup {
    server: MockServer,
    work: TempDir,
    input: PathBuf,
}

async fn setup() -> Setup {
    let server = MockServer::start_async().await;
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("upload.png");
    std::fs::write(&input, encode(&test_image(20, 10), ImageFormat::Png)).unwrap();
    Setup {
        server,
        work,
        input,
    }
}

fn client(setup: &Setup) -> RemoteEnhancerClient {
    RemoteEnhancerClient::new(&setup.server.base_url(), "real-esrgan", Duration::from_secs(5))
        .unwrap()
        .with_work_dir(setup.work.path())
}

fn enhanced_png() -> Vec<u8> {
    encode(&test_image(40, 20), ImageFormat::Png)
}

#[tokio::test]
async fn test_inline_result_is_written_and_owned() {
    let setup = setup().await;
    let upscale = setup
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/images/upscale")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(r#"{"model": "real-esrgan", "scale": "2x"}"#);
            then.status(200)
                .json_body(json!({ "data": [{ "b64_json": STANDARD.encode(enhanced_png()) }] }));
        })
        .await;

    let client = client(&setup).with_api_key(Some("sk-test".to_string()));
    let file = client.enhance(&setup.input, EnhanceScale::X2).await.unwrap();

    upscale.assert_async().await;
    assert!(file.path().starts_with(setup.work.path()));
    assert_eq!(read_dimensions(file.path()).unwrap().width, 40);

    // Upload plus the enhanced result
    assert_eq!(dir_entries(setup.work.path()), 2);
    drop(file);
    assert_eq!(dir_entries(setup.work.path()), 1);
}

#[tokio::test]
async fn test_url_result_is_downloaded() {
    let setup = setup().await;
    let download_url = setup.server.url("/results/out.png");
    setup
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/upscale");
            then.status(200)
                .json_body(json!({ "data": [{ "url": download_url }] }));
        })
        .await;
    let download = setup
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/results/out.png");
            then.status(200)
                .header("content-type", "image/png")
                .body(enhanced_png());
        })
        .await;

    let file = client(&setup)
        .enhance(&setup.input, EnhanceScale::X4)
        .await
        .unwrap();

    download.assert_async().await;
    assert_eq!(read_dimensions(file.path()).unwrap().height, 20);
}

#[tokio::test]
async fn test_quota_response_is_classified() {
    let setup = setup().await;
    let upscale = setup
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/upscale");
            then.status(429)
                .json_body(json!({ "error": { "message": "You have exceeded your monthly Quota" } }));
        })
        .await;

    let err = client(&setup)
        .enhance(&setup.input, EnhanceScale::X2)
        .await
        .unwrap_err();

    assert!(err.is_quota(), "expected quota error, got {:?}", err);
    // Single attempt, no retry
    upscale.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_server_error_is_not_quota() {
    let setup = setup().await;
    setup
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/upscale");
            then.status(500).body("CUDA out of memory");
        })
        .await;

    let err = client(&setup)
        .enhance(&setup.input, EnhanceScale::X2)
        .await
        .unwrap_err();

    assert!(!err.is_quota());
    match err {
        EnhanceError::Remote { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "CUDA out of memory");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(dir_entries(setup.work.path()), 1);
}

#[tokio::test]
async fn test_error_field_in_success_body_is_a_failure() {
    let setup = setup().await;
    setup
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/images/upscale");
            then.status(200)
                .json_body(json!({ "error": "quota exhausted for today" }));
        })
        .await;

    let err = client(&setup)
        .enhance(&setup.input, EnhanceScale::X2)
        .await
        .unwrap_err();

    assert!(err.is_quota());
}

#[tokio::test]
async fn test_malformed_responses() {
    let bodies = vec![
        json!({ "data": [] }),
        json!({ "data": [{}] }),
        json!({ "data": [{ "b64_json": "!!!not base64!!!" }] }),
        json!({ "data": [{ "b64_json": "" }] }),
    ];

    for body in bodies {
        let setup = setup().await;
        setup
            .server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/images/upscale");
                then.status(200).json_body(body.clone());
            })
            .await;

        let err = client(&setup)
            .enhance(&setup.input, EnhanceScale::X2)
            .await
            .unwrap_err();

        assert!(
            matches!(err, EnhanceError::MalformedResponse(_)),
            "{} gave {:?}",
            body,
            err
        );
    }
}

#[tokio::test]
async fn test_health_check() {
    let setup = setup().await;
    setup
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({ "status": "ok" }));
        })
        .await;

    assert!(client(&setup).health_check().await);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("upload.png");
    std::fs::write(&input, encode(&test_image(4, 4), ImageFormat::Png)).unwrap();

    let client = RemoteEnhancerClient::new("http://127.0.0.1:9", "m", Duration::from_secs(2)).unwrap();
    let err = client.enhance(&input, EnhanceScale::X2).await.unwrap_err();

    assert!(matches!(err, EnhanceError::Transport(_)));
}
