//! Output aspect presets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output size presets offered by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectPreset {
    /// 9:16 (1080×1920)
    #[default]
    Vertical,
    /// 16:9 (1920×1080)
    Horizontal,
    /// 1:1 (1080×1080)
    Square,
}

impl AspectPreset {
    pub const ALL: &'static [AspectPreset] = &[
        AspectPreset::Vertical,
        AspectPreset::Horizontal,
        AspectPreset::Square,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectPreset::Vertical => "vertical",
            AspectPreset::Horizontal => "horizontal",
            AspectPreset::Square => "square",
        }
    }

    /// Output size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectPreset::Vertical => (1080, 1920),
            AspectPreset::Horizontal => (1920, 1080),
            AspectPreset::Square => (1080, 1080),
        }
    }

    /// Ratio label, e.g. "9:16".
    pub fn ratio(&self) -> &'static str {
        match self {
            AspectPreset::Vertical => "9:16",
            AspectPreset::Horizontal => "16:9",
            AspectPreset::Square => "1:1",
        }
    }
}

impl fmt::Display for AspectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectPreset {
    type Err = AspectPresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vertical" | "portrait" | "9:16" => Ok(AspectPreset::Vertical),
            "horizontal" | "landscape" | "16:9" => Ok(AspectPreset::Horizontal),
            "square" | "1:1" => Ok(AspectPreset::Square),
            _ => Err(AspectPresetParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown aspect preset: {0}")]
pub struct AspectPresetParseError(String);
