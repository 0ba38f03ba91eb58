// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod detection;
pub mod enhancement;
pub mod imaging;
pub mod pipeline;
pub mod version;

// Re-export main types
pub use config::{ConfigError, NodeConfig};
pub use detection::{DetectionError, DetectionOutput, Detector, ObbDetector, OrientedDetection};
pub use enhancement::{
    EnhanceError, EnhanceScale, EnhancedFile, EnhancementArbiter, EnhancementResult, Enhancer,
    ImageOrigin, RemoteEnhancerClient,
};
pub use imaging::{Dimensions, ImageError};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput, UploadError};
