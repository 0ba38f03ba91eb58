// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Oriented object detection over the chosen image
//!
//! - `preprocessing`: letterbox into the square model input
//! - `model`: ONNX Runtime session for the YOLOv8-OBB weights
//! - `postprocessing`: decode, rotated NMS, inverse mapping
//! - `render`: polygons and captions drawn onto the image
//!
//! Detection is synchronous and CPU bound; callers run it on the blocking
//! pool.

pub mod detector;
pub mod labels;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod render;

use bytes::Bytes;
use image::DynamicImage;
use thiserror::Error;

use crate::imaging::{encode_jpeg, ImageError};

pub use detector::{load_detector, ObbDetector};
pub use labels::{label_for, DOTA_CLASSES};
pub use model::ObbModel;
pub use postprocessing::{decode_output, rotated_nms, DecodeParams, OrientedDetection};
pub use preprocessing::{letterbox, Letterbox, OBB_INPUT_SIZE};
pub use render::{Renderer, MAX_LINE_THICKNESS};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detection model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Render failed: {0}")]
    Render(#[from] ImageError),

    #[error("Detection task aborted: {0}")]
    Aborted(String),
}

/// Rendered JPEG plus the predictions it was drawn from
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub detections: Vec<OrientedDetection>,
    /// Encoded JPEG, starting at byte 0
    pub jpeg: Bytes,
}

impl DetectionOutput {
    pub fn count(&self) -> usize {
        self.detections.len()
    }
}

pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionOutput, DetectionError>;

    fn name(&self) -> &str;

    fn is_ready(&self) -> bool {
        true
    }
}

/// Draw `detections` onto `image` and encode the result
pub fn render_output(
    renderer: &Renderer,
    image: &DynamicImage,
    detections: Vec<OrientedDetection>,
    jpeg_quality: u8,
) -> Result<DetectionOutput, DetectionError> {
    let canvas = renderer.render(image, &detections);
    let jpeg = encode_jpeg(&canvas, jpeg_quality)?;
    Ok(DetectionOutput {
        detections,
        jpeg: Bytes::from(jpeg),
    })
}

/// Stands in for a detector whose model failed to load
///
/// The node still serves health checks; every detection fails.
#[derive(Debug, Clone)]
pub struct UnavailableDetector {
    name: String,
    reason: String,
}

impl UnavailableDetector {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Detector for UnavailableDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<DetectionOutput, DetectionError> {
        Err(DetectionError::ModelUnavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
