// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection upload endpoint module
//!
//! Provides POST /upload and POST /v1/detect, returning an annotated JPEG.

pub mod handler;

pub use handler::{detect_handler, ACCEPTED_FIELDS, DETECTIONS_HEADER, IMAGE_ORIGIN_HEADER, REQUEST_ID_HEADER};
