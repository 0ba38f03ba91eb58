// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub detector: DetectorHealth,
    pub enhancer: EnhancerHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorHealth {
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancerHealth {
    pub name: String,
    /// False when no endpoint is set and every upload is used as-is
    pub configured: bool,
}
