// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request-scoped copy of the upload on disk

use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PipelineStage, UploadError};

/// The persisted upload, deleted when closed or dropped
///
/// Dropping covers every early return and a cancelled request future, so
/// the file never outlives its request.
#[derive(Debug)]
pub struct ScopedInput {
    path: Option<TempPath>,
    request_id: Uuid,
}

impl ScopedInput {
    /// Write `bytes` to `upload-<request_id>-<random>.<extension>` in
    /// `work_dir`
    pub fn persist(
        work_dir: &Path,
        request_id: Uuid,
        bytes: &[u8],
        extension: &str,
    ) -> Result<Self, UploadError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("upload-{}-", request_id))
            .suffix(&format!(".{}", extension))
            .tempfile_in(work_dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        debug!(
            %request_id,
            stage = %PipelineStage::InputPersisted,
            "Upload persisted to {}",
            path.display()
        );

        Ok(Self {
            path: Some(path),
            request_id,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete now, reporting failure
    pub fn close(mut self) -> std::io::Result<()> {
        self.cleanup()
    }

    fn cleanup(&mut self) -> std::io::Result<()> {
        match self.path.take() {
            Some(path) => {
                let removed = path.to_path_buf();
                path.close()?;
                debug!(
                    request_id = %self.request_id,
                    stage = %PipelineStage::InputCleanedUp,
                    "Removed {}",
                    removed.display()
                );
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScopedInput {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(
                request_id = %self.request_id,
                "Failed to remove upload copy: {}", e
            );
        }
    }
}
