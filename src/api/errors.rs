// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::detection::DetectionError;
use crate::pipeline::{PipelineError, UploadError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidUpload(String),
    PayloadTooLarge(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message) = match self {
            ApiError::InvalidUpload(msg) => ("invalid_upload", msg.clone()),
            ApiError::PayloadTooLarge(msg) => ("payload_too_large", msg.clone()),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone()),
            ApiError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidUpload(_) => 400,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::InternalError(_) => 500,
        }
    }

    /// Attach the request id for the JSON body
    pub fn for_request(self, request_id: Uuid) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self,
            request_id: Some(request_id.to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidUpload(msg) => write!(f, "Invalid upload: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::Upload(UploadError::TooLarge { .. }) => ApiError::PayloadTooLarge(message),
            PipelineError::Upload(UploadError::Io(_)) => ApiError::InternalError(message),
            PipelineError::Upload(_) => ApiError::InvalidUpload(message),
            PipelineError::Detection(DetectionError::ModelUnavailable(_)) => {
                ApiError::ServiceUnavailable(message)
            }
            PipelineError::Detection(_) | PipelineError::Task(_) => ApiError::InternalError(message),
        }
    }
}

// Error response wrapper
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: Option<String>,
}

impl From<ApiError> for ApiErrorResponse {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.error.to_response(self.request_id);

        (status, Json(body)).into_response()
    }
}
