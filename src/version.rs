// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the skyscan detection node

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-obb-detection-2025-10-16";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-10-16";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "obb-detection",
    "dota-v1-labels",
    "remote-super-resolution",
    "never-regress-enhancement",
    "quota-fallback",
    "multipart-upload",
    "jpeg-output",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Skyscan Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
