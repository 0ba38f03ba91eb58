// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload endpoint handler

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::errors::{ApiError, ApiErrorResponse};
use crate::api::http_server::AppState;
use crate::pipeline::PipelineStage;

/// Multipart field names accepted for the image, first match wins
pub const ACCEPTED_FIELDS: &[&str] = &["file", "image"];

pub const DETECTIONS_HEADER: &str = "x-detections";
pub const IMAGE_ORIGIN_HEADER: &str = "x-image-origin";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// POST /upload, POST /v1/detect - Annotate an uploaded image
///
/// # Request
/// `multipart/form-data` with the image in a `file` or `image` part.
///
/// # Response
/// `image/jpeg` body with rotated boxes drawn on it. `x-detections` carries
/// the number of boxes, `x-image-origin` whether the enhanced image was used.
///
/// # Errors
/// - 400 Bad Request: missing part, empty or undecodable image
/// - 413 Payload Too Large: upload over the configured limit
/// - 503 Service Unavailable: detection model not loaded
/// - 500 Internal Server Error: temp file I/O or inference failure
pub async fn detect_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiErrorResponse> {
    let request_id = Uuid::new_v4();

    let mut multipart = multipart.map_err(|e| {
        warn!(%request_id, "Rejected upload: {}", e);
        ApiError::InvalidUpload(e.body_text()).for_request(request_id)
    })?;

    let upload = read_upload(&mut multipart)
        .await
        .map_err(|e| {
            warn!(%request_id, "Rejected upload: {}", e);
            e.for_request(request_id)
        })?;

    let output = state
        .pipeline
        .run_with_id(request_id, upload)
        .await
        .map_err(|e| {
            warn!(%request_id, "Detection request failed: {}", e);
            ApiError::from(e).for_request(request_id)
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(output.content_type));
    headers.insert(
        HeaderName::from_static(DETECTIONS_HEADER),
        HeaderValue::from(output.detection_count()),
    );
    headers.insert(
        HeaderName::from_static(IMAGE_ORIGIN_HEADER),
        HeaderValue::from_static(match output.origin {
            crate::enhancement::ImageOrigin::Original => "original",
            crate::enhancement::ImageOrigin::Enhanced => "enhanced",
        }),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    debug!(
        %request_id,
        stage = %PipelineStage::Streamed,
        bytes = output.jpeg.len()
    );

    Ok((StatusCode::OK, headers, output.jpeg).into_response())
}

/// Bytes of the first accepted image part
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let accepted = field
            .name()
            .map_or(false, |name| ACCEPTED_FIELDS.contains(&name));
        if !accepted {
            continue;
        }

        debug!(
            "Upload field {:?} ({})",
            field.file_name().unwrap_or("unnamed"),
            field.content_type().unwrap_or("no content type")
        );
        return field.bytes().await.map_err(multipart_error);
    }

    Err(ApiError::InvalidUpload(
        "multipart field `file` or `image` is required".to_string(),
    ))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::InvalidUpload(format!("Multipart error: {}", err.body_text()))
    }
}
