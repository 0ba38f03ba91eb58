// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Chooses the image that goes to detection
//!
//! The enhanced image is only used when it is strictly larger than the
//! upload on both axes and decodes cleanly. Any failure on the enhancement
//! path (remote error, quota, timeout, panic, unreadable result) falls back
//! to the upload; `choose` has no error path.

use futures::FutureExt;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EnhanceScale, EnhancedFile, Enhancer};
use crate::imaging::{decode_image_file, read_dimensions, Dimensions, MAX_ENHANCED_IMAGE_SIZE};

/// Which image was handed to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOrigin {
    Original,
    Enhanced,
}

impl fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageOrigin::Original => f.write_str("original"),
            ImageOrigin::Enhanced => f.write_str("enhanced"),
        }
    }
}

/// The decoded upload together with its persisted copy
#[derive(Debug)]
pub struct SourceImage {
    path: PathBuf,
    image: DynamicImage,
    dimensions: Dimensions,
}

impl SourceImage {
    pub fn new(path: impl Into<PathBuf>, image: DynamicImage) -> Self {
        let dimensions = Dimensions::of(&image);
        Self {
            path: path.into(),
            image,
            dimensions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

/// The single, already decoded image selected for detection
#[derive(Debug)]
pub struct ChosenImage {
    pub image: DynamicImage,
    pub origin: ImageOrigin,
    pub dimensions: Dimensions,
}

impl ChosenImage {
    fn original(source: SourceImage) -> Self {
        Self {
            image: source.image,
            origin: ImageOrigin::Original,
            dimensions: source.dimensions,
        }
    }
}

/// Outcome of one enhancement attempt
#[derive(Debug)]
pub enum EnhancementResult {
    Success {
        file: EnhancedFile,
        dimensions: Dimensions,
    },
    Unavailable(String),
    QuotaExceeded(String),
}

/// Pure decision over an attempt's outcome
pub fn select(original: Dimensions, result: &EnhancementResult) -> ImageOrigin {
    match result {
        EnhancementResult::Success { dimensions, .. } if dimensions.strictly_exceeds(&original) => {
            ImageOrigin::Enhanced
        }
        _ => ImageOrigin::Original,
    }
}

pub struct EnhancementArbiter {
    enhancer: Arc<dyn Enhancer>,
    scale: EnhanceScale,
    timeout: Duration,
}

impl EnhancementArbiter {
    pub fn new(enhancer: Arc<dyn Enhancer>, scale: EnhanceScale, timeout: Duration) -> Self {
        Self {
            enhancer,
            scale,
            timeout,
        }
    }

    pub fn enhancer(&self) -> &Arc<dyn Enhancer> {
        &self.enhancer
    }

    pub fn scale(&self) -> EnhanceScale {
        self.scale
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decide between the upload and its enhanced version
    pub async fn choose(&self, source: SourceImage) -> ChosenImage {
        let original = source.dimensions;
        let result = self.attempt(source.path()).await;

        match &result {
            EnhancementResult::Success { dimensions, .. } => {
                debug!("Enhancer returned {} for {} original", dimensions, original)
            }
            EnhancementResult::QuotaExceeded(reason) => {
                warn!("Enhancement quota exhausted, using original: {}", reason)
            }
            EnhancementResult::Unavailable(reason) => {
                warn!("Enhancement unavailable, using original: {}", reason)
            }
        }

        match (select(original, &result), result) {
            (ImageOrigin::Enhanced, EnhancementResult::Success { file, dimensions }) => {
                match self.load_enhanced(file, original).await {
                    Some(image) => {
                        info!("Using enhanced image {} (original {})", dimensions, original);
                        ChosenImage {
                            dimensions: Dimensions::of(&image),
                            image,
                            origin: ImageOrigin::Enhanced,
                        }
                    }
                    None => ChosenImage::original(source),
                }
            }
            (_, EnhancementResult::Success { dimensions, .. }) => {
                info!(
                    "Enhanced image {} does not exceed original {}, using original",
                    dimensions, original
                );
                ChosenImage::original(source)
            }
            _ => ChosenImage::original(source),
        }
    }

    /// One bounded attempt; every failure is folded into the result
    async fn attempt(&self, path: &Path) -> EnhancementResult {
        let call = AssertUnwindSafe(self.enhancer.enhance(path, self.scale)).catch_unwind();

        let file = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                return EnhancementResult::Unavailable(format!(
                    "{} timed out after {:?}",
                    self.enhancer.name(),
                    self.timeout
                ))
            }
            Ok(Err(_)) => {
                return EnhancementResult::Unavailable(format!(
                    "{} panicked during enhancement",
                    self.enhancer.name()
                ))
            }
            Ok(Ok(Err(e))) if e.is_quota() => {
                return EnhancementResult::QuotaExceeded(e.to_string())
            }
            Ok(Ok(Err(e))) => return EnhancementResult::Unavailable(e.to_string()),
            Ok(Ok(Ok(file))) => file,
        };

        let path = file.path().to_path_buf();
        let probed = tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Err(format!("enhanced result missing at {}", path.display()));
            }
            read_dimensions(&path)
                .map_err(|e| format!("enhanced result at {} unreadable: {}", path.display(), e))
        })
        .await;

        match probed {
            Ok(Ok(dimensions)) => EnhancementResult::Success { file, dimensions },
            Ok(Err(reason)) => EnhancementResult::Unavailable(reason),
            Err(e) => EnhancementResult::Unavailable(format!("result probe task failed: {}", e)),
        }
    }

    /// Fully decode the enhanced file; `None` means fall back
    async fn load_enhanced(&self, file: EnhancedFile, original: Dimensions) -> Option<DynamicImage> {
        let path = file.path().to_path_buf();
        let decoded =
            tokio::task::spawn_blocking(move || decode_image_file(&path, MAX_ENHANCED_IMAGE_SIZE))
                .await;
        drop(file);

        match decoded {
            Ok(Ok((image, _))) if Dimensions::of(&image).strictly_exceeds(&original) => Some(image),
            Ok(Ok((image, _))) => {
                warn!(
                    "Enhanced image decoded as {}, not larger than {}, using original",
                    Dimensions::of(&image),
                    original
                );
                None
            }
            Ok(Err(e)) => {
                warn!("Enhanced image failed to decode, using original: {}", e);
                None
            }
            Err(e) => {
                warn!("Enhanced image decode task failed, using original: {}", e);
                None
            }
        }
    }
}
