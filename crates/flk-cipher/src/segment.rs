//! Block segmentation and the seeded block shuffle.
//!
//! The image is padded to a whole number of square blocks, blocks are
//! numbered row-major, and destination block `i` is filled from source block
//! `mapping[i]`. Bands of block rows are written in parallel; each band is a
//! disjoint slice of the output.

use image::{imageops, RgbaImage};
use rayon::prelude::*;

use flk_core::config::SegmentationConfig;
use flk_core::types::blocks_along;
use flk_core::{FlkError, FlkResult, SegmentationParameters};

use crate::random::DeterministicRandomSource;

pub const SMALL_LIMIT: u32 = 768;
pub const SMALL_SEGMENT: u32 = 4;
pub const MEDIUM_LIMIT: u32 = 1920;
pub const MEDIUM_SEGMENT: u32 = 16;
pub const LARGE_SEGMENT: u32 = 32;

const CHANNELS: usize = 4;

/// Segment size table keyed on the larger image dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBuckets {
    pub small_limit: u32,
    pub small_segment: u32,
    pub medium_limit: u32,
    pub medium_segment: u32,
    pub large_segment: u32,
}

impl Default for SegmentBuckets {
    fn default() -> Self {
        Self {
            small_limit: SMALL_LIMIT,
            small_segment: SMALL_SEGMENT,
            medium_limit: MEDIUM_LIMIT,
            medium_segment: MEDIUM_SEGMENT,
            large_segment: LARGE_SEGMENT,
        }
    }
}

impl From<&SegmentationConfig> for SegmentBuckets {
    fn from(config: &SegmentationConfig) -> Self {
        Self {
            small_limit: config.small_limit,
            small_segment: config.small_segment,
            medium_limit: config.medium_limit,
            medium_segment: config.medium_segment,
            large_segment: config.large_segment,
        }
    }
}

impl SegmentBuckets {
    pub fn segment_size_for(&self, width: u32, height: u32) -> u32 {
        let longest = width.max(height);
        if longest <= self.small_limit {
            self.small_segment
        } else if longest <= self.medium_limit {
            self.medium_segment
        } else {
            self.large_segment
        }
    }
}

/// Smallest multiple of `segment` that is `>= len`.
pub fn padded_len(len: u32, segment: u32) -> FlkResult<u32> {
    if segment == 0 {
        return Err(FlkError::Validation("segment size must be positive".into()));
    }
    blocks_along(len, segment)
        .checked_mul(segment)
        .ok_or_else(|| FlkError::Validation(format!("{len} px cannot be padded to {segment}")))
}

/// Extend the canvas right and down to a multiple of `segment`. New pixels
/// are transparent; the original stays at the origin.
pub fn pad_to_multiple(image: &RgbaImage, segment: u32) -> FlkResult<RgbaImage> {
    let (width, height) = image.dimensions();
    let padded_w = padded_len(width, segment)?;
    let padded_h = padded_len(height, segment)?;
    if (padded_w, padded_h) == (width, height) {
        return Ok(image.clone());
    }

    let mut canvas = RgbaImage::new(padded_w, padded_h);
    imageops::replace(&mut canvas, image, 0, 0);
    Ok(canvas)
}

/// Shuffled padded image plus the layout needed to undo it.
#[derive(Debug, Clone)]
pub struct ShuffledImage {
    pub image: RgbaImage,
    pub params: SegmentationParameters,
}

/// Pick the segment size from `buckets`, pad, and shuffle blocks with `rng`.
pub fn segment_and_shuffle(
    image: &RgbaImage,
    rng: &mut DeterministicRandomSource,
    buckets: &SegmentBuckets,
) -> FlkResult<ShuffledImage> {
    let (width, height) = image.dimensions();
    segment_and_shuffle_with_size(image, buckets.segment_size_for(width, height), rng)
}

pub fn segment_and_shuffle_with_size(
    image: &RgbaImage,
    segment_size: u32,
    rng: &mut DeterministicRandomSource,
) -> FlkResult<ShuffledImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FlkError::Validation(format!(
            "cannot segment an empty {width}x{height} image"
        )));
    }

    let padded = pad_to_multiple(image, segment_size)?;
    let blocks = u64::from(blocks_along(padded.width(), segment_size))
        * u64::from(blocks_along(padded.height(), segment_size));
    let blocks = u32::try_from(blocks)
        .map_err(|_| FlkError::Validation(format!("{blocks} blocks is too many to index")))?;

    let params = SegmentationParameters {
        segment_size,
        padded_width: padded.width(),
        padded_height: padded.height(),
        mapping: rng.permutation(blocks),
    };
    let shuffled = permute_blocks(&padded, segment_size, &params.mapping)?;

    tracing::debug!(
        segment_size,
        padded_width = params.padded_width,
        padded_height = params.padded_height,
        blocks,
        "blocks shuffled"
    );
    Ok(ShuffledImage {
        image: shuffled,
        params,
    })
}

/// Undo [`segment_and_shuffle`]. Returns the padded image.
pub fn unshuffle(shuffled: &RgbaImage, params: &SegmentationParameters) -> FlkResult<RgbaImage> {
    params.validate()?;
    if shuffled.dimensions() != (params.padded_width, params.padded_height) {
        return Err(FlkError::Validation(format!(
            "shuffled image is {}x{}, key material expects {}x{}",
            shuffled.width(),
            shuffled.height(),
            params.padded_width,
            params.padded_height
        )));
    }

    let mut reverse = vec![0u32; params.mapping.len()];
    for (dst, &src) in params.mapping.iter().enumerate() {
        reverse[src as usize] = dst as u32;
    }
    permute_blocks(shuffled, params.segment_size, &reverse)
}

/// Output block `i` is copied from input block `source_of[i]`.
fn permute_blocks(src: &RgbaImage, segment: u32, source_of: &[u32]) -> FlkResult<RgbaImage> {
    let (width, height) = src.dimensions();
    let seg = segment as usize;
    let blocks_x = (width / segment) as usize;
    let stride = width as usize * CHANNELS;
    let span = seg * CHANNELS;
    let src_raw = src.as_raw();

    let mut out = vec![0u8; src_raw.len()];
    out.par_chunks_mut(stride * seg)
        .enumerate()
        .for_each(|(block_row, band)| {
            for col in 0..blocks_x {
                let from = source_of[block_row * blocks_x + col] as usize;
                let from_x = (from % blocks_x) * seg;
                let from_y = (from / blocks_x) * seg;
                for r in 0..seg {
                    let s = (from_y + r) * stride + from_x * CHANNELS;
                    let d = r * stride + col * span;
                    band[d..d + span].copy_from_slice(&src_raw[s..s + span]);
                }
            }
        });

    RgbaImage::from_raw(width, height, out)
        .ok_or_else(|| FlkError::Image("block permutation produced a short buffer".into()))
}
