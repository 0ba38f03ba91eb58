// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Opportunistic super-resolution ahead of detection
//!
//! - `client` - HTTP client for the remote upscaling sidecar
//! - `arbiter` - decides whether the enhanced or the original image is used
//!
//! Enhancement never fails a request: every error in this module is absorbed
//! by the arbiter, which falls back to the uploaded image.

pub mod arbiter;
pub mod client;
pub mod error;
pub mod scale;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::info;

use crate::config::EnhancerConfig;

pub use arbiter::{
    select, ChosenImage, EnhancementArbiter, EnhancementResult, ImageOrigin, SourceImage,
};
pub use client::{DisabledEnhancer, RemoteEnhancerClient};
pub use error::{mentions_quota, EnhanceError, QUOTA_MARKER};
pub use scale::{EnhanceScale, ALLOWED_SCALES};

/// A super-resolution capability
///
/// Implementations make a single attempt and report failure as an
/// `EnhanceError`; retries and deadlines belong to the caller.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(
        &self,
        image_path: &Path,
        scale: EnhanceScale,
    ) -> Result<EnhancedFile, EnhanceError>;

    /// Name used in logs and the health endpoint
    fn name(&self) -> &str;

    /// False for the placeholder used when no endpoint is configured
    fn is_configured(&self) -> bool {
        true
    }
}

/// Local path of an enhancement result
///
/// Files written by this node are owned and removed on drop; paths handed
/// back by other implementations are left alone.
#[derive(Debug)]
pub struct EnhancedFile {
    path: PathBuf,
    _guard: Option<TempPath>,
}

impl EnhancedFile {
    pub fn owned(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            _guard: Some(temp),
        }
    }

    pub fn external(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _guard: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Remote client when an endpoint is configured, otherwise the disabled
/// placeholder
pub fn build_enhancer(
    config: &EnhancerConfig,
    work_dir: &Path,
) -> anyhow::Result<Arc<dyn Enhancer>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            let client =
                RemoteEnhancerClient::new(endpoint, &config.model, config.transport_timeout())?
                    .with_api_key(config.api_key.clone())
                    .with_work_dir(work_dir);
            Ok(Arc::new(client))
        }
        _ => {
            info!("No enhancer endpoint configured, enhancement disabled");
            Ok(Arc::new(DisabledEnhancer))
        }
    }
}
