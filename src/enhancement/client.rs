// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Super-resolution sidecar client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{EnhanceError, EnhanceScale, EnhancedFile, Enhancer};
use crate::imaging::{detect_format, format_to_extension};

/// Transport timeout used when none is configured
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct UpscaleRequest<'a> {
    model: &'a str,
    image: String,
    scale: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpscaleResponse {
    #[serde(default)]
    data: Vec<UpscaleData>,
    #[serde(default)]
    error: Option<RemoteErrorBody>,
}

#[derive(Debug, Deserialize)]
struct UpscaleData {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl RemoteErrorBody {
    fn into_message(self) -> String {
        match self {
            RemoteErrorBody::Detailed { message } => message,
            RemoteErrorBody::Plain(message) => message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<RemoteErrorBody>,
    #[serde(default)]
    detail: Option<String>,
}

/// Client for an upscaling sidecar speaking a small JSON protocol
///
/// `POST {endpoint}/v1/images/upscale` with the image as base64; the reply
/// carries the enhanced image inline (`b64_json`) or as a downloadable `url`.
pub struct RemoteEnhancerClient {
    client: Client,
    endpoint: String,
    model_name: String,
    api_key: Option<String>,
    work_dir: PathBuf,
}

impl RemoteEnhancerClient {
    pub fn new(endpoint: &str, model_name: &str, transport_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(transport_timeout).build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Enhancer client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
            api_key: None,
            work_dir: std::env::temp_dir(),
        })
    }

    /// Directory that receives downloaded results
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if the upscaling sidecar is healthy
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Enhancer health check failed: {}", e);
                false
            }
        }
    }

    /// Upscale the image at `image_path`, returning the local path of the result
    pub async fn upscale(
        &self,
        image_path: &Path,
        scale: EnhanceScale,
    ) -> Result<EnhancedFile, EnhanceError> {
        let start = std::time::Instant::now();
        let source = tokio::fs::read(image_path).await?;

        let body = UpscaleRequest {
            model: &self.model_name,
            image: STANDARD.encode(&source),
            scale: scale.as_str(),
        };

        let url = format!("{}/v1/images/upscale", self.endpoint);
        debug!("Enhancer upscale POST {} (scale={})", url, scale);

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnhanceError::from_remote(
                status.as_u16(),
                failure_reason(&text),
            ));
        }

        let api_response: UpscaleResponse = response
            .json()
            .await
            .map_err(|e| EnhanceError::MalformedResponse(e.to_string()))?;

        if let Some(error) = api_response.error {
            return Err(EnhanceError::from_remote(status.as_u16(), error.into_message()));
        }

        let first = api_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EnhanceError::MalformedResponse("empty data array".to_string()))?;

        let enhanced = match (first.b64_json, first.url) {
            (Some(b64), _) => STANDARD
                .decode(b64.trim())
                .map_err(|e| EnhanceError::MalformedResponse(format!("invalid base64: {}", e)))?,
            (None, Some(url)) => self.download(&url).await?,
            (None, None) => {
                return Err(EnhanceError::MalformedResponse(
                    "no b64_json or url in response".to_string(),
                ))
            }
        };

        if enhanced.is_empty() {
            return Err(EnhanceError::MalformedResponse(
                "enhanced image is empty".to_string(),
            ));
        }

        let size = enhanced.len();
        let work_dir = self.work_dir.clone();
        let file = tokio::task::spawn_blocking(move || persist(&work_dir, &enhanced))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        debug!(
            "Enhancer returned {} bytes in {}ms -> {}",
            size,
            start.elapsed().as_millis(),
            file.path().display()
        );
        Ok(file)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, EnhanceError> {
        debug!("Enhancer result download GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnhanceError::from_remote(
                status.as_u16(),
                failure_reason(&text),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }

}

/// Write the result into `work_dir` as a file owned by the returned handle
fn persist(work_dir: &Path, bytes: &[u8]) -> Result<EnhancedFile, EnhanceError> {
    let extension = detect_format(bytes)
        .map(format_to_extension)
        .unwrap_or("img");
    let mut file = tempfile::Builder::new()
        .prefix("enhanced-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(work_dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(EnhancedFile::owned(file.into_temp_path()))
}

#[async_trait]
impl Enhancer for RemoteEnhancerClient {
    async fn enhance(
        &self,
        image_path: &Path,
        scale: EnhanceScale,
    ) -> Result<EnhancedFile, EnhanceError> {
        self.upscale(image_path, scale).await
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Stand-in used when no enhancement endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEnhancer;

#[async_trait]
impl Enhancer for DisabledEnhancer {
    async fn enhance(
        &self,
        _image_path: &Path,
        _scale: EnhanceScale,
    ) -> Result<EnhancedFile, EnhanceError> {
        Err(EnhanceError::NotConfigured)
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Pull a human-readable reason out of an error body
fn failure_reason(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    match serde_json::from_str::<ErrorEnvelope>(trimmed) {
        Ok(ErrorEnvelope {
            error: Some(error), ..
        }) => error.into_message(),
        Ok(ErrorEnvelope {
            detail: Some(detail),
            ..
        }) => detail,
        _ => trimmed.to_string(),
    }
}
