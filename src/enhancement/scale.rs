// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Super-resolution scale factors accepted by the remote enhancer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scale modifiers the enhancement service understands
pub const ALLOWED_SCALES: &[&str] = &["2x", "3x", "4x", "8x"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnhanceScale {
    #[default]
    X2,
    X3,
    X4,
    X8,
}

impl EnhanceScale {
    /// Integer upscaling factor
    pub fn factor(&self) -> u32 {
        match self {
            EnhanceScale::X2 => 2,
            EnhanceScale::X3 => 3,
            EnhanceScale::X4 => 4,
            EnhanceScale::X8 => 8,
        }
    }

    /// Wire representation ("2x", "4x", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhanceScale::X2 => "2x",
            EnhanceScale::X3 => "3x",
            EnhanceScale::X4 => "4x",
            EnhanceScale::X8 => "8x",
        }
    }

    /// Parse either the modifier form ("4x") or the bare integer ("4")
    pub fn parse(s: &str) -> Result<Self, String> {
        let normalized = s.trim().to_ascii_lowercase();
        let digits = normalized.strip_suffix('x').unwrap_or(&normalized);
        match digits {
            "2" => Ok(EnhanceScale::X2),
            "3" => Ok(EnhanceScale::X3),
            "4" => Ok(EnhanceScale::X4),
            "8" => Ok(EnhanceScale::X8),
            _ => Err(format!(
                "invalid scale '{}'; allowed: {}",
                s,
                ALLOWED_SCALES.join(", ")
            )),
        }
    }
}

impl fmt::Display for EnhanceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnhanceScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EnhanceScale {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EnhanceScale> for String {
    fn from(scale: EnhanceScale) -> Self {
        scale.as_str().to_string()
    }
}
