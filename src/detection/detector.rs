// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX-backed oriented box detector

use anyhow::Result;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::model::ObbModel;
use super::postprocessing::{decode_output, DecodeParams};
use super::preprocessing::letterbox;
use super::render::Renderer;
use super::{render_output, DetectionError, DetectionOutput, Detector, UnavailableDetector};
use crate::config::DetectorConfig;

/// Letterbox, infer, decode, render, encode
#[derive(Debug)]
pub struct ObbDetector {
    name: String,
    model: ObbModel,
    renderer: Renderer,
    params: DecodeParams,
    input_size: u32,
    jpeg_quality: u8,
}

impl ObbDetector {
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        let model = ObbModel::load(&config.model_path, config.intra_threads)?;

        let mut renderer = Renderer::default().with_line_thickness(config.line_thickness);
        if let Some(font_path) = &config.label_font_path {
            renderer = renderer.with_font_file(font_path)?;
        }

        Ok(Self {
            name: config.model_name(),
            model,
            renderer,
            params: DecodeParams {
                confidence_threshold: config.confidence_threshold,
                iou_threshold: config.iou_threshold,
                max_detections: config.max_detections,
            },
            input_size: config.input_size,
            jpeg_quality: config.jpeg_quality,
        })
    }

    pub fn params(&self) -> &DecodeParams {
        &self.params
    }
}

impl Detector for ObbDetector {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionOutput, DetectionError> {
        let start = Instant::now();
        let (tensor, placement) = letterbox(image, self.input_size);

        let raw = self
            .model
            .infer(tensor)
            .map_err(|e| DetectionError::Inference(format!("{:#}", e)))?;

        let detections =
            decode_output(raw.view(), &placement, &self.params).map_err(DetectionError::Inference)?;
        debug!(
            "{} detections after NMS in {}ms",
            detections.len(),
            start.elapsed().as_millis()
        );

        render_output(&self.renderer, image, detections, self.jpeg_quality)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load the configured detector once at startup
///
/// A model that fails to load does not stop the node; the returned
/// placeholder fails every detection with `ModelUnavailable`.
pub fn load_detector(config: &DetectorConfig) -> Arc<dyn Detector> {
    match ObbDetector::load(config) {
        Ok(detector) => {
            info!("Detector {} ready", detector.name());
            Arc::new(detector)
        }
        Err(e) => {
            error!("Failed to load detector: {:#}", e);
            Arc::new(UnavailableDetector::new(
                config.model_name(),
                format!("{:#}", e),
            ))
        }
    }
}
