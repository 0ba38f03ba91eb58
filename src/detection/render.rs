// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Draws oriented detections onto the chosen image

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::info;

use super::labels::color_for;
use super::postprocessing::OrientedDetection;

pub const DEFAULT_LINE_THICKNESS: u32 = 2;

/// Upper bound on box edge thickness in pixels
pub const MAX_LINE_THICKNESS: u32 = 32;
pub const DEFAULT_FONT_SCALE: f32 = 16.0;

pub struct Renderer {
    font: Option<FontVec>,
    line_thickness: u32,
    font_scale: f32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            font: None,
            line_thickness: DEFAULT_LINE_THICKNESS,
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("has_font", &self.font.is_some())
            .field("line_thickness", &self.line_thickness)
            .field("font_scale", &self.font_scale)
            .finish()
    }
}

impl Renderer {
    /// Load a TTF/OTF file for `"<label> <conf>"` captions
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read label font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid label font {}: {}", path.display(), e))?;
        info!("Label font loaded from {}", path.display());
        self.font = Some(font);
        Ok(self)
    }

    pub fn with_line_thickness(mut self, thickness: u32) -> Self {
        self.line_thickness = thickness.clamp(1, MAX_LINE_THICKNESS);
        self
    }

    pub fn line_thickness(&self) -> u32 {
        self.line_thickness
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Copy of `image` with every detection drawn on it
    pub fn render(&self, image: &DynamicImage, detections: &[OrientedDetection]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for detection in detections {
            let color = Rgb(color_for(detection.class_id));
            let corners = detection.corners();
            self.draw_polygon(&mut canvas, &corners, color);

            let (x, y) = anchor_point(&corners);
            match &self.font {
                Some(font) => self.draw_caption(&mut canvas, font, detection, x, y, color),
                None => self.draw_tag(&mut canvas, x, y, color),
            }
        }
        canvas
    }

    fn draw_polygon(&self, canvas: &mut RgbImage, corners: &[[f32; 2]; 4], color: Rgb<u8>) {
        let half = (self.line_thickness / 2) as i32;
        let low = -half;
        let high = self.line_thickness as i32 - half - 1;

        for i in 0..corners.len() {
            let a = corners[i];
            let b = corners[(i + 1) % corners.len()];
            for dx in low..=high {
                for dy in low..=high {
                    draw_line_segment_mut(
                        canvas,
                        (a[0] + dx as f32, a[1] + dy as f32),
                        (b[0] + dx as f32, b[1] + dy as f32),
                        color,
                    );
                }
            }
        }
    }

    fn draw_caption(
        &self,
        canvas: &mut RgbImage,
        font: &FontVec,
        detection: &OrientedDetection,
        x: i32,
        y: i32,
        color: Rgb<u8>,
    ) {
        let text = format!("{} {:.2}", detection.label, detection.confidence);
        let scale = PxScale::from(self.font_scale);
        let (text_w, text_h) = text_size(scale, font, &text);

        let box_w = text_w + 4;
        let box_h = text_h + 4;
        let top = (y - box_h as i32).max(0);
        let left = x.max(0);

        draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(box_w, box_h), color);
        draw_text_mut(
            canvas,
            contrasting_text(color),
            left + 2,
            top + 2,
            scale,
            font,
            &text,
        );
    }

    fn draw_tag(&self, canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
        let side = (self.line_thickness * 4).max(6);
        let top = (y - side as i32).max(0);
        draw_filled_rect_mut(canvas, Rect::at(x.max(0), top).of_size(side, side), color);
    }
}

/// Top-most corner, leftmost on ties
fn anchor_point(corners: &[[f32; 2]; 4]) -> (i32, i32) {
    let top = corners.iter().fold(corners[0], |best, c| {
        if c[1] < best[1] || (c[1] == best[1] && c[0] < best[0]) {
            *c
        } else {
            best
        }
    });
    (top[0].round() as i32, top[1].round() as i32)
}

fn contrasting_text(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 150.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}
