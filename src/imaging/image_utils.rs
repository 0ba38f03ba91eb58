// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and utility functions for the detection pipeline

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cap on an uploaded image payload (20MB)
pub const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024;

/// Cap on an enhancer result; a 4x upscale of a full-size upload must fit
pub const MAX_ENHANCED_IMAGE_SIZE: usize = 16 * MAX_IMAGE_SIZE;

/// Custom error types for image processing
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,

    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),
}

/// Pixel dimensions of a raster image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// True when both axes are strictly larger than `other`'s
    pub fn strictly_exceeds(&self, other: &Dimensions) -> bool {
        self.width > other.width && self.height > other.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub dimensions: Dimensions,
    /// Detected format
    pub format: ImageFormat,
    /// Size in bytes
    pub size_bytes: usize,
}

/// Decode raw image bytes of at most `max_bytes`
///
/// The format is sniffed from magic bytes rather than trusted from a
/// filename or content type.
pub fn decode_image_bytes(
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(DynamicImage, ImageInfo), ImageError> {
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge(bytes.len(), max_bytes));
    }

    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let format = detect_format(bytes)?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let info = ImageInfo {
        dimensions: Dimensions::of(&img),
        format,
        size_bytes: bytes.len(),
    };

    Ok((img, info))
}

/// Read and decode an image file from disk
pub fn decode_image_file(
    path: &Path,
    max_bytes: usize,
) -> Result<(DynamicImage, ImageInfo), ImageError> {
    let bytes = std::fs::read(path)?;
    decode_image_bytes(&bytes, max_bytes)
}

/// Read only the header of an image file to get its dimensions
///
/// Like the byte decoders, the format comes from the file contents, so a
/// missing or wrong extension does not matter.
pub fn read_dimensions(path: &Path) -> Result<Dimensions, ImageError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    if reader.format().is_none() {
        return Err(ImageError::UnsupportedFormat);
    }
    let (width, height) = reader.into_dimensions().map_err(|e| match e {
        image::ImageError::IoError(io) => ImageError::Io(io),
        other => ImageError::DecodeFailed(other.to_string()),
    })?;
    Ok(Dimensions::new(width, height))
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF87a / GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II or MM
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(ImageError::UnsupportedFormat),
    }
}

/// Get the format extension as a string
pub fn format_to_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => "img",
    }
}

/// Encode an RGB raster as JPEG
///
/// The buffer is written through a cursor which is rewound before the bytes
/// are handed back, so the result can be copied straight into a response.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut cursor = Cursor::new(Vec::with_capacity(
        (image.width() * image.height()) as usize / 4,
    ));
    JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    cursor.set_position(0);
    Ok(cursor.into_inner())
}
