//! Diversity screen for keystream images.
//!
//! A keystream that is mostly one color (or mostly the black interior of the
//! set) leaks the plaintext through the XOR, so candidates are measured and
//! rejected until one is varied enough.

use std::collections::HashMap;

use image::RgbaImage;
use serde::Serialize;

use flk_core::config::GeneratorConfig;

/// Accepted images need strictly more distinct colors than this.
pub const MIN_UNIQUE_COLORS: usize = 250;

/// The most frequent color must cover strictly less than this share.
pub const MAX_COLOR_SHARE: f64 = 0.25;

/// At most this fraction of pixels may be black.
pub const MAX_BLACK_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_unique_colors: usize,
    pub max_color_share: f64,
    pub max_black_fraction: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_unique_colors: MIN_UNIQUE_COLORS,
            max_color_share: MAX_COLOR_SHARE,
            max_black_fraction: MAX_BLACK_FRACTION,
        }
    }
}

impl From<&GeneratorConfig> for QualityThresholds {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            min_unique_colors: config.min_unique_colors,
            max_color_share: config.max_color_share,
            max_black_fraction: config.max_black_fraction,
        }
    }
}

/// Color statistics of one candidate keystream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityReport {
    pub unique_colors: usize,
    /// Share of pixels taken by the most frequent color
    pub max_color_share: f64,
    pub black_fraction: f64,
}

impl QualityReport {
    /// Measure RGB diversity. Alpha is ignored.
    pub fn measure(image: &RgbaImage) -> Self {
        let total = (image.width() as usize * image.height() as usize).max(1);
        let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
        for px in image.pixels() {
            *counts.entry([px[0], px[1], px[2]]).or_insert(0) += 1;
        }

        let most_frequent = counts.values().copied().max().unwrap_or(0);
        let black = counts.get(&[0, 0, 0]).copied().unwrap_or(0);

        Self {
            unique_colors: counts.len(),
            max_color_share: most_frequent as f64 / total as f64,
            black_fraction: black as f64 / total as f64,
        }
    }

    pub fn accepts(&self, thresholds: &QualityThresholds) -> bool {
        self.unique_colors > thresholds.min_unique_colors
            && self.max_color_share < thresholds.max_color_share
            && self.black_fraction <= thresholds.max_black_fraction
    }
}
