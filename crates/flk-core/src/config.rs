use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FlkError, FlkResult};

/// Top-level configuration (loaded from fractalock.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlkConfig {
    pub generator: GeneratorConfig,
    pub segmentation: SegmentationConfig,
    pub kdf: KdfConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl FlkConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> FlkResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| FlkError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> FlkResult<Self> {
        let config: FlkConfig =
            toml::from_str(content).map_err(|e| FlkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FlkResult<()> {
        let g = &self.generator;
        if g.zoom_min <= 0.0 || g.zoom_min > g.zoom_max {
            return Err(FlkError::Config(format!(
                "generator zoom range [{}, {}] is invalid",
                g.zoom_min, g.zoom_max
            )));
        }
        if g.max_iter_step == 0 || g.max_iter_min == 0 || g.max_iter_min > g.max_iter_max {
            return Err(FlkError::Config(format!(
                "generator iteration range [{}, {}] step {} is invalid",
                g.max_iter_min, g.max_iter_max, g.max_iter_step
            )));
        }
        if !(0.0..=1.0).contains(&g.max_color_share) || !(0.0..=1.0).contains(&g.max_black_fraction)
        {
            return Err(FlkError::Config(
                "generator share/fraction thresholds must lie in [0, 1]".into(),
            ));
        }
        if g.offset_limit <= 0.0 {
            return Err(FlkError::Config("generator offset_limit must be positive".into()));
        }
        let s = &self.segmentation;
        if s.small_segment == 0 || s.medium_segment == 0 || s.large_segment == 0 {
            return Err(FlkError::Config("segment sizes must be positive".into()));
        }
        if s.small_limit > s.medium_limit {
            return Err(FlkError::Config(
                "segmentation small_limit must not exceed medium_limit".into(),
            ));
        }
        if self.kdf.pbkdf2_iterations == 0 {
            return Err(FlkError::Config("pbkdf2_iterations must be positive".into()));
        }
        Ok(())
    }
}

/// Fractal keystream search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Render worker count (0 = available parallelism)
    pub workers: usize,
    /// An accepted image needs strictly more distinct colors than this
    pub min_unique_colors: usize,
    /// An accepted image's most frequent color must stay strictly below this share
    pub max_color_share: f64,
    /// An accepted image may have at most this fraction of black pixels
    pub max_black_fraction: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub max_iter_min: u32,
    pub max_iter_max: u32,
    pub max_iter_step: u32,
    /// Offsets are drawn from [-offset_limit, offset_limit]
    pub offset_limit: f64,
    /// Give up after this many rejected attempts (0 = keep searching)
    pub max_attempts: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            min_unique_colors: 250,
            max_color_share: 0.25,
            max_black_fraction: 0.05,
            zoom_min: 100_000.0,
            zoom_max: 144_000.0,
            max_iter_min: 500,
            max_iter_max: 1400,
            max_iter_step: 10,
            offset_limit: 0.9998,
            max_attempts: 0,
        }
    }
}

/// Segment size buckets keyed on the larger image dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub small_limit: u32,
    pub small_segment: u32,
    pub medium_limit: u32,
    pub medium_segment: u32,
    pub large_segment: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            small_limit: 768,
            small_segment: 4,
            medium_limit: 1920,
            medium_segment: 16,
            large_segment: 32,
        }
    }
}

/// At-rest key derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2-HMAC-SHA256 work factor (default: 65536)
    pub pbkdf2_iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 65_536,
        }
    }
}

/// Login handshake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of an issued login nonce in seconds (default: 15)
    pub nonce_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { nonce_ttl_secs: 15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
