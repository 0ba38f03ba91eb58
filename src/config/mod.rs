// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Every section has defaults. A TOML file (named by `SKYSCAN_CONFIG`) is
//! read first, then environment variables override individual fields.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::detection::MAX_LINE_THICKNESS;
use crate::enhancement::EnhanceScale;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "SKYSCAN_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e| ConfigError::invalid("api.listen_addr", format!("{}: {}", self.listen_addr, e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// Base URL of the upscaling sidecar; enhancement is disabled when unset
    pub endpoint: Option<String>,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub scale: EnhanceScale,
    /// Deadline for one whole enhancement attempt
    pub timeout_secs: u64,
    /// reqwest transport timeout
    pub transport_timeout_secs: u64,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "real-esrgan".to_string(),
            api_key: None,
            scale: EnhanceScale::default(),
            timeout_secs: 30,
            transport_timeout_secs: 60,
        }
    }
}

impl EnhancerConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.as_deref().map_or(false, |e| !e.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// TTF/OTF used for captions; a colour tag is drawn without one
    pub label_font_path: Option<PathBuf>,
    pub line_thickness: u32,
    pub intra_threads: usize,
    pub jpeg_quality: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/yolov8n-obb.onnx"),
            input_size: 1024,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            label_font_path: None,
            line_thickness: 2,
            intra_threads: 4,
            jpeg_quality: 90,
        }
    }
}

impl DetectorConfig {
    /// Display name derived from the weights file
    pub fn model_name(&self) -> String {
        self.model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "obb-detector".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Holds request-scoped uploads and enhanced results
    pub work_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("skyscan"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub api: ApiConfig,
    pub enhancer: EnhancerConfig,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// File (if `SKYSCAN_CONFIG` is set), then environment, then validation
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading configuration from {}", path);
                Self::from_file(Path::new(&path))?
            }
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("API_LISTEN_ADDR") {
            self.api.listen_addr = v;
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            self.api.max_upload_bytes = parse_field("api.max_upload_bytes", &v)?;
        }

        if let Some(v) = get("ENHANCER_ENDPOINT") {
            self.enhancer.endpoint = Some(v);
        }
        if let Some(v) = get("ENHANCER_MODEL") {
            self.enhancer.model = v;
        }
        if let Some(v) = get("ENHANCER_API_KEY") {
            self.enhancer.api_key = Some(v);
        }
        if let Some(v) = get("ENHANCER_SCALE") {
            self.enhancer.scale = parse_field("enhancer.scale", &v)?;
        }
        if let Some(v) = get("ENHANCER_TIMEOUT_SECS") {
            self.enhancer.timeout_secs = parse_field("enhancer.timeout_secs", &v)?;
        }
        if let Some(v) = get("ENHANCER_TRANSPORT_TIMEOUT_SECS") {
            self.enhancer.transport_timeout_secs =
                parse_field("enhancer.transport_timeout_secs", &v)?;
        }

        if let Some(v) = get("DETECTOR_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(v);
        }
        if let Some(v) = get("DETECTOR_INPUT_SIZE") {
            self.detector.input_size = parse_field("detector.input_size", &v)?;
        }
        if let Some(v) = get("DETECTOR_CONFIDENCE") {
            self.detector.confidence_threshold = parse_field("detector.confidence_threshold", &v)?;
        }
        if let Some(v) = get("DETECTOR_IOU") {
            self.detector.iou_threshold = parse_field("detector.iou_threshold", &v)?;
        }
        if let Some(v) = get("DETECTOR_MAX_DETECTIONS") {
            self.detector.max_detections = parse_field("detector.max_detections", &v)?;
        }
        if let Some(v) = get("DETECTOR_FONT_PATH") {
            self.detector.label_font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DETECTOR_INTRA_THREADS") {
            self.detector.intra_threads = parse_field("detector.intra_threads", &v)?;
        }
        if let Some(v) = get("JPEG_QUALITY") {
            self.detector.jpeg_quality = parse_field("detector.jpeg_quality", &v)?;
        }

        if let Some(v) = get("WORK_DIR") {
            self.pipeline.work_dir = PathBuf::from(v);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.socket_addr()?;
        if self.api.max_upload_bytes == 0 {
            return Err(ConfigError::invalid("api.max_upload_bytes", "must be greater than 0"));
        }

        if self.enhancer.timeout_secs == 0 {
            return Err(ConfigError::invalid("enhancer.timeout_secs", "must be greater than 0"));
        }
        if self.enhancer.transport_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "enhancer.transport_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.enhancer.model.trim().is_empty() {
            return Err(ConfigError::invalid("enhancer.model", "must not be empty"));
        }

        let detector = &self.detector;
        if detector.input_size == 0 {
            return Err(ConfigError::invalid("detector.input_size", "must be greater than 0"));
        }
        check_unit_interval("detector.confidence_threshold", detector.confidence_threshold)?;
        check_unit_interval("detector.iou_threshold", detector.iou_threshold)?;
        if detector.max_detections == 0 {
            return Err(ConfigError::invalid("detector.max_detections", "must be greater than 0"));
        }
        if !(1..=MAX_LINE_THICKNESS).contains(&detector.line_thickness) {
            return Err(ConfigError::invalid(
                "detector.line_thickness",
                format!("{} is outside 1..={}", detector.line_thickness, MAX_LINE_THICKNESS),
            ));
        }
        if !(1..=100).contains(&detector.jpeg_quality) {
            return Err(ConfigError::invalid(
                "detector.jpeg_quality",
                format!("{} is outside 1..=100", detector.jpeg_quality),
            ));
        }

        Ok(())
    }

    /// Effective settings as TOML; the API key is never written out
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_field<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(field, format!("{:?}: {}", value, e)))
}

fn check_unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} is outside [0, 1]", value)))
    }
}
