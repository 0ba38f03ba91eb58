// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Letterbox preprocessing for the OBB model

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// Default square input size of the OBB weights
pub const OBB_INPUT_SIZE: u32 = 1024;

/// Grey used for letterbox padding
pub const PAD_VALUE: u8 = 114;

/// How the source image was placed inside the model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Input pixels per source pixel; mapping back divides by it
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub input_size: u32,
}

impl Letterbox {
    /// Map a point from model-input space back to source-image space
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Map a length from model-input space back to source-image space
    pub fn length_to_source(&self, length: f32) -> f32 {
        length / self.scale
    }
}

/// Resize preserving aspect ratio, pad to a square, and build an NCHW
/// tensor of `[0, 1]` RGB values
pub fn letterbox(image: &DynamicImage, input_size: u32) -> (Array4<f32>, Letterbox) {
    let (canvas, placement) = letterbox_image(image, input_size);
    let size = input_size as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, placement)
}

/// The padded RGB canvas the tensor is built from
pub fn letterbox_image(image: &DynamicImage, input_size: u32) -> (RgbImage, Letterbox) {
    let (orig_w, orig_h) = image.dimensions();
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));

    if orig_w == 0 || orig_h == 0 {
        return (
            canvas,
            Letterbox {
                scale: 1.0,
                pad_x: 0,
                pad_y: 0,
                input_size,
            },
        );
    }

    let scale = (input_size as f32 / orig_w as f32).min(input_size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, input_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, input_size);

    let resized = image
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let pad_x = (input_size - new_w) / 2;
    let pad_y = (input_size - new_h) / 2;
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x,
            pad_y,
            input_size,
        },
    )
}
