// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::time::Duration;
use thiserror::Error;

/// Failure-reason marker that identifies usage-limit exhaustion
pub const QUOTA_MARKER: &str = "quota";

/// HTTP status a rate-limited or out-of-quota service answers with
const TOO_MANY_REQUESTS: u16 = 429;

/// Why a remote enhancement attempt did not produce an image
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("enhancement service not configured")]
    NotConfigured,

    #[error("enhancement request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("enhancement service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("enhancement quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("malformed enhancement response: {0}")]
    MalformedResponse(String),

    #[error("enhancement timed out after {0:?}")]
    Timeout(Duration),

    #[error("enhancement file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl EnhanceError {
    /// Classify a remote failure by status code and reason text
    pub fn from_remote(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == TOO_MANY_REQUESTS || mentions_quota(&message) {
            EnhanceError::QuotaExhausted(message)
        } else {
            EnhanceError::Remote { status, message }
        }
    }

    /// Quota failures are only distinguished for logging
    pub fn is_quota(&self) -> bool {
        matches!(self, EnhanceError::QuotaExhausted(_)) || mentions_quota(&self.to_string())
    }
}

/// Case-insensitive check for the quota marker
pub fn mentions_quota(text: &str) -> bool {
    text.to_ascii_lowercase().contains(QUOTA_MARKER)
}
