// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of raw OBB model output into oriented detections
//!
//! The model emits `[1, 4 + C + 1, N]`: for each of `N` anchors the rows are
//! `cx, cy, w, h` in input pixels, `C` class scores, then the box angle in
//! radians. Some exports transpose the last two axes; both layouts are
//! accepted.

use ndarray::ArrayViewD;
use serde::Serialize;
use std::f32::consts::PI;

use super::labels::label_for;
use super::preprocessing::Letterbox;

/// Thresholds applied while decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// A rotated bounding box in image pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrientedDetection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    /// Rotation in radians, normalized to `[0, π)` with `width >= height`
    pub angle: f32,
}

impl OrientedDetection {
    /// Corner points in drawing order
    pub fn corners(&self) -> [[f32; 2]; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let v1 = [self.width / 2.0 * cos, self.width / 2.0 * sin];
        let v2 = [-self.height / 2.0 * sin, self.height / 2.0 * cos];
        let c = [self.cx, self.cy];
        [
            [c[0] + v1[0] + v2[0], c[1] + v1[1] + v2[1]],
            [c[0] + v1[0] - v2[0], c[1] + v1[1] - v2[1]],
            [c[0] - v1[0] - v2[0], c[1] - v1[1] - v2[1]],
            [c[0] - v1[0] + v2[0], c[1] - v1[1] + v2[1]],
        ]
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over union of the two rotated rectangles
    pub fn iou(&self, other: &OrientedDetection) -> f32 {
        let inter = polygon_area(&clip_polygon(&self.corners(), &other.corners())).abs();
        let union = self.area() + other.area() - inter;
        if union <= f32::EPSILON {
            0.0
        } else {
            (inter / union).clamp(0.0, 1.0)
        }
    }
}

/// Decode, filter, suppress and map detections back to source pixels
pub fn decode_output(
    output: ArrayViewD<f32>,
    letterbox: &Letterbox,
    params: &DecodeParams,
) -> Result<Vec<OrientedDetection>, String> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(format!(
            "unexpected OBB output shape {:?}, expected [1, 4 + C + 1, N]",
            shape
        ));
    }

    // Features are the shorter axis
    let transposed = shape[1] > shape[2];
    let (features, anchors) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if features < 6 {
        return Err(format!(
            "OBB output has {} features per anchor, need at least 6",
            features
        ));
    }
    let num_classes = features - 5;
    let at = |feature: usize, anchor: usize| -> f32 {
        if transposed {
            output[[0, anchor, feature]]
        } else {
            output[[0, feature, anchor]]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (0..num_classes)
            .map(|c| (c, at(4 + c, anchor)))
            .fold((0, f32::MIN), |best, (c, score)| {
                if score > best.1 {
                    (c, score)
                } else {
                    best
                }
            });

        if confidence < params.confidence_threshold || !confidence.is_finite() {
            continue;
        }

        let (width, height, angle) = regularize(
            at(2, anchor),
            at(3, anchor),
            at(4 + num_classes, anchor),
        );
        if width <= 0.0 || height <= 0.0 {
            continue;
        }

        let (cx, cy) = letterbox.to_source(at(0, anchor), at(1, anchor));
        candidates.push(OrientedDetection {
            class_id,
            label: label_for(class_id),
            confidence,
            cx,
            cy,
            width: letterbox.length_to_source(width),
            height: letterbox.length_to_source(height),
            angle,
        });
    }

    Ok(rotated_nms(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Class-aware greedy NMS over rotated boxes
///
/// Ties in confidence keep anchor order, so output is deterministic.
pub fn rotated_nms(
    mut detections: Vec<OrientedDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<OrientedDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<OrientedDetection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Make `width` the long side and fold the angle into `[0, π)`
fn regularize(width: f32, height: f32, angle: f32) -> (f32, f32, f32) {
    let (w, h, t) = if width >= height {
        (width, height, angle)
    } else {
        (height, width, angle + PI / 2.0)
    };
    (w, h, t.rem_euclid(PI))
}

/// Signed shoelace area; positive for counter-clockwise in y-up space
fn polygon_area(points: &[[f32; 2]]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum / 2.0
}

fn side(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn intersection(p1: [f32; 2], p2: [f32; 2], a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    let d1 = side(a, b, p1);
    let d2 = side(a, b, p2);
    let denom = d1 - d2;
    if denom.abs() <= f32::EPSILON {
        return p2;
    }
    let t = d1 / denom;
    [p1[0] + t * (p2[0] - p1[0]), p1[1] + t * (p2[1] - p1[1])]
}

/// Sutherland-Hodgman clipping of `subject` by the convex polygon `clip`
fn clip_polygon(subject: &[[f32; 2]], clip: &[[f32; 2]]) -> Vec<[f32; 2]> {
    let orientation = polygon_area(clip).signum();
    if orientation == 0.0 || polygon_area(subject) == 0.0 {
        return Vec::new();
    }

    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);

        for j in 0..input.len() {
            let current = input[j];
            let previous = input[(j + input.len() - 1) % input.len()];
            let current_inside = side(a, b, current) * orientation >= 0.0;
            let previous_inside = side(a, b, previous) * orientation >= 0.0;

            if current_inside {
                if !previous_inside {
                    output.push(intersection(previous, current, a, b));
                }
                output.push(current);
            } else if previous_inside {
                output.push(intersection(previous, current, a, b));
            }
        }
    }
    output
}
