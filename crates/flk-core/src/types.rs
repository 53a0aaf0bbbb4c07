use serde::{Deserialize, Serialize};

use crate::error::{FlkError, FlkResult};

/// Rectangle of the source image that gets encrypted.
///
/// `is_whole` areas always start at the origin and span the full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionArea {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
    pub is_whole: bool,
}

impl EncryptionArea {
    /// Area covering an entire `width` x `height` image.
    pub fn whole(width: u32, height: u32) -> Self {
        Self {
            start_x: 0,
            start_y: 0,
            width,
            height,
            is_whole: true,
        }
    }

    pub fn partial(start_x: u32, start_y: u32, width: u32, height: u32) -> Self {
        Self {
            start_x,
            start_y,
            width,
            height,
            is_whole: false,
        }
    }

    /// Check that the area is non-empty and lies inside an image of the given size.
    pub fn validate_within(&self, image_width: u32, image_height: u32) -> FlkResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FlkError::Validation(format!(
                "area must have positive dimensions, got {}x{}",
                self.width, self.height
            )));
        }
        if self.is_whole {
            if self.start_x != 0 || self.start_y != 0 {
                return Err(FlkError::Validation(
                    "whole-image area must start at the origin".into(),
                ));
            }
            if self.width != image_width || self.height != image_height {
                return Err(FlkError::Validation(format!(
                    "whole-image area {}x{} does not match image {}x{}",
                    self.width, self.height, image_width, image_height
                )));
            }
            return Ok(());
        }

        let end_x = u64::from(self.start_x) + u64::from(self.width);
        let end_y = u64::from(self.start_y) + u64::from(self.height);
        if end_x > u64::from(image_width) || end_y > u64::from(image_height) {
            return Err(FlkError::Validation(format!(
                "area ({}, {}, {}x{}) exceeds image bounds {}x{}",
                self.start_x, self.start_y, self.width, self.height, image_width, image_height
            )));
        }
        Ok(())
    }
}

/// Everything needed to re-render one keystream image byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MandelbrotParameters {
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub max_iterations: u32,
}

impl MandelbrotParameters {
    pub fn validate(&self) -> FlkResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FlkError::Validation(format!(
                "fractal dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(FlkError::Validation(format!(
                "fractal zoom must be finite and positive, got {}",
                self.zoom
            )));
        }
        if !self.offset_x.is_finite() || !self.offset_y.is_finite() {
            return Err(FlkError::Validation("fractal offsets must be finite".into()));
        }
        if self.max_iterations == 0 {
            return Err(FlkError::Validation(
                "fractal max_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Block layout and permutation produced by segmentation.
///
/// `mapping[dst] = src`: destination block `dst` of the shuffled image holds
/// source block `src`. Always a bijection over `0..block_count()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationParameters {
    pub segment_size: u32,
    pub padded_width: u32,
    pub padded_height: u32,
    pub mapping: Vec<u32>,
}

impl SegmentationParameters {
    pub fn blocks_x(&self) -> u32 {
        blocks_along(self.padded_width, self.segment_size)
    }

    pub fn blocks_y(&self) -> u32 {
        blocks_along(self.padded_height, self.segment_size)
    }

    pub fn block_count(&self) -> usize {
        self.blocks_x() as usize * self.blocks_y() as usize
    }

    /// Check sizes line up and `mapping` is a bijection over the block indices.
    pub fn validate(&self) -> FlkResult<()> {
        if self.segment_size == 0 {
            return Err(FlkError::Validation("segment size must be positive".into()));
        }
        if self.padded_width == 0 || self.padded_height == 0 {
            return Err(FlkError::Validation(
                "padded dimensions must be positive".into(),
            ));
        }
        if self.padded_width % self.segment_size != 0 || self.padded_height % self.segment_size != 0
        {
            return Err(FlkError::Validation(format!(
                "padded size {}x{} is not a multiple of segment size {}",
                self.padded_width, self.padded_height, self.segment_size
            )));
        }
        let n = self.block_count();
        if self.mapping.len() != n {
            return Err(FlkError::Validation(format!(
                "mapping has {} entries, expected {}",
                self.mapping.len(),
                n
            )));
        }
        let mut seen = vec![false; n];
        for &src in &self.mapping {
            let slot = seen.get_mut(src as usize).ok_or_else(|| {
                FlkError::Validation(format!("mapping index {src} out of range 0..{n}"))
            })?;
            if *slot {
                return Err(FlkError::Validation(format!(
                    "mapping index {src} appears twice"
                )));
            }
            *slot = true;
        }
        Ok(())
    }
}

/// Number of `segment`-sized blocks needed to cover `len` pixels.
pub fn blocks_along(len: u32, segment: u32) -> u32 {
    if segment == 0 {
        return 0;
    }
    len.div_ceil(segment)
}
