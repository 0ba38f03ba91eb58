// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image decoding, format sniffing and dimension helpers shared by the
//! enhancement and detection stages.

pub mod image_utils;

pub use image_utils::{
    decode_image_bytes, decode_image_file, detect_format, encode_jpeg, format_to_extension,
    read_dimensions, Dimensions, ImageError, ImageInfo, MAX_ENHANCED_IMAGE_SIZE,
    MAX_IMAGE_SIZE,
};
