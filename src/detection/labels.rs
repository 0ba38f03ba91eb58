// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! DOTA-v1 class names and the drawing palette

/// Class names for the DOTA-v1 trained OBB weights, in model output order
pub const DOTA_CLASSES: &[&str] = &[
    "plane",
    "ship",
    "storage tank",
    "baseball diamond",
    "tennis court",
    "basketball court",
    "ground track field",
    "harbor",
    "bridge",
    "large vehicle",
    "small vehicle",
    "helicopter",
    "roundabout",
    "soccer ball field",
    "swimming pool",
];

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

pub fn label_for(class_id: usize) -> String {
    DOTA_CLASSES
        .get(class_id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

pub fn color_for(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}
