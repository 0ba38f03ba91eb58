// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv8-OBB ONNX session wrapper

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Oriented bounding box model
///
/// The session is loaded once and shared. `Session::run` needs exclusive
/// access, so inference calls are serialized through the mutex.
pub struct ObbModel {
    session: Mutex<Session>,
    input_name: String,
    model_path: PathBuf,
}

impl std::fmt::Debug for ObbModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObbModel")
            .field("input_name", &self.input_name)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

impl ObbModel {
    /// Load the OBB model from an ONNX file
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime rejects it.
    pub fn load<P: AsRef<Path>>(model_path: P, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("OBB model not found: {}", model_path.display());
        }

        info!("Loading OBB model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads.max(1))
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load OBB model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        if let Some(output) = session.outputs.first() {
            debug!(
                "OBB model loaded - input: {}, output: {}",
                input_name, output.name
            );
        }

        info!("OBB model loaded (CPU)");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Run the model on an NCHW `[1, 3, S, S]` tensor and return the raw
    /// first output
    pub fn infer(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let shape = input.shape();
        if shape[0] != 1 || shape[1] != 3 {
            anyhow::bail!("Invalid input shape: {:?}, expected [1, 3, S, S]", shape);
        }

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("OBB session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("OBB inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?
            .to_owned();

        debug!("OBB output shape: {:?}", output.shape());
        Ok(output)
    }
}
