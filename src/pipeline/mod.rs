// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload → enhancement arbiter → detector → JPEG
//!
//! Per request:
//! `Received → InputPersisted → EnhancementChosen → Detected → Streamed`,
//! with `InputCleanedUp` on every exit from `InputPersisted`.

pub mod input;

use anyhow::Context;
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::detection::{load_detector, DetectionError, Detector, OrientedDetection};
use crate::enhancement::{build_enhancer, EnhancementArbiter, Enhancer, ImageOrigin, SourceImage};
use crate::imaging::{decode_image_bytes, detect_format, format_to_extension, Dimensions, ImageError};

pub use input::ScopedInput;

pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    InputPersisted,
    EnhancementChosen,
    Detected,
    Streamed,
    InputCleanedUp,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::InputPersisted => "input_persisted",
            PipelineStage::EnhancementChosen => "enhancement_chosen",
            PipelineStage::Detected => "detected",
            PipelineStage::Streamed => "streamed",
            PipelineStage::InputCleanedUp => "input_cleaned_up",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload is empty")]
    Empty,

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Upload I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}

/// Everything the caller needs to stream the result
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub jpeg: Bytes,
    pub content_type: &'static str,
    pub origin: ImageOrigin,
    pub dimensions: Dimensions,
    pub detections: Vec<OrientedDetection>,
}

impl PipelineOutput {
    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }
}

pub struct Pipeline {
    arbiter: EnhancementArbiter,
    detector: Arc<dyn Detector>,
    work_dir: PathBuf,
    max_upload_bytes: usize,
}

impl Pipeline {
    pub fn new(
        arbiter: EnhancementArbiter,
        detector: Arc<dyn Detector>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            arbiter,
            detector,
            work_dir: work_dir.into(),
            max_upload_bytes: usize::MAX,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Build the enhancer, load the detector and prepare the work directory
    pub fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let work_dir = &config.pipeline.work_dir;
        std::fs::create_dir_all(work_dir)
            .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;

        let enhancer = build_enhancer(&config.enhancer, work_dir)?;
        let arbiter = EnhancementArbiter::new(
            enhancer,
            config.enhancer.scale,
            config.enhancer.timeout(),
        );
        let detector = load_detector(&config.detector);

        Ok(Self::new(arbiter, detector, work_dir.clone())
            .with_max_upload_bytes(config.api.max_upload_bytes))
    }

    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    pub fn enhancer(&self) -> &Arc<dyn Enhancer> {
        self.arbiter.enhancer()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn run(&self, upload: Bytes) -> Result<PipelineOutput, PipelineError> {
        self.run_with_id(Uuid::new_v4(), upload).await
    }

    pub async fn run_with_id(
        &self,
        request_id: Uuid,
        upload: Bytes,
    ) -> Result<PipelineOutput, PipelineError> {
        self.execute(request_id, upload)
            .instrument(info_span!("pipeline", %request_id))
            .await
    }

    async fn execute(&self, request_id: Uuid, upload: Bytes) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();
        debug!(stage = %PipelineStage::Received, bytes = upload.len());

        if upload.is_empty() {
            return Err(UploadError::Empty.into());
        }
        if upload.len() > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size: upload.len(),
                limit: self.max_upload_bytes,
            }
            .into());
        }

        let format = detect_format(&upload).map_err(UploadError::from)?;
        let decode_bytes = upload.clone();
        let limit = self.max_upload_bytes;
        let (image, _) =
            tokio::task::spawn_blocking(move || decode_image_bytes(&decode_bytes, limit))
                .await
                .map_err(|e| PipelineError::Task(format!("decode task failed: {}", e)))?
                .map_err(UploadError::from)?;

        let work_dir = self.work_dir.clone();
        let extension = format_to_extension(format);
        let input = tokio::task::spawn_blocking(move || {
            ScopedInput::persist(&work_dir, request_id, &upload, extension)
        })
        .await
        .map_err(|e| PipelineError::Task(format!("persist task failed: {}", e)))??;

        let chosen = self
            .arbiter
            .choose(SourceImage::new(input.path(), image))
            .await;
        debug!(
            stage = %PipelineStage::EnhancementChosen,
            origin = %chosen.origin,
            dimensions = %chosen.dimensions
        );

        let detector = Arc::clone(&self.detector);
        let image = chosen.image;
        let output = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| DetectionError::Aborted(e.to_string()))??;
        debug!(stage = %PipelineStage::Detected, detections = output.count());

        if let Err(e) = input.close() {
            warn!("Failed to remove upload copy: {}", e);
        }

        info!(
            "Request complete: {} detections on {} image {} in {}ms",
            output.count(),
            chosen.origin,
            chosen.dimensions,
            start.elapsed().as_millis()
        );

        Ok(PipelineOutput {
            request_id,
            jpeg: output.jpeg,
            content_type: OUTPUT_CONTENT_TYPE,
            origin: chosen.origin,
            dimensions: chosen.dimensions,
            detections: output.detections,
        })
    }
}
