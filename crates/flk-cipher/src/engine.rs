//! Encrypt/decrypt: shuffle the selected area, XOR it with a Mandelbrot
//! keystream, and splice the result back.
//!
//! The shuffled region is padded up to a whole number of blocks, so it can be
//! larger than the area it came from. To keep decryption exact, the cipher
//! image gains a gutter: `paddedW - w` columns inserted right of the area and
//! `paddedH - h` rows inserted below it. Pixels right of or below the area
//! shift by the gutter size; gutter pixels outside the cipher region are
//! transparent. A whole-image area simply grows the canvas to the padded size.
//!
//! ```text
//!  source W x H                  cipher (W + gw) x (H + gh)
//!  ┌────────────────┐            ┌──────────────────┐
//!  │   ┌──────┐     │            │   ┌────────┐     │
//!  │   │ area │     │    ──▶     │   │ cipher │     │
//!  │   └──────┘     │            │   │ region │     │
//!  │                │            │   └────────┘     │
//!  └────────────────┘            └──────────────────┘
//! ```

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flk_core::config::FlkConfig;
use flk_core::{EncryptionArea, FlkError, FlkResult, MandelbrotParameters};
use flk_crypto::MasterSeed;

use crate::fractal::{FractalGenerator, ProgressFn, ValidatedFractal};
use crate::key_material::KeyMaterial;
use crate::random::DeterministicRandomSource;
use crate::segment::{padded_len, segment_and_shuffle, unshuffle, SegmentBuckets};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Where the keystream for an encryption comes from.
pub enum KeystreamSource<'a> {
    /// Search for a fresh keystream that passes the diversity screen.
    Search {
        cancel: &'a CancellationToken,
        progress: Option<ProgressFn<'a>>,
    },
    /// A keystream the caller already accepted; must match the padded size
    /// (see [`CipherEngine::keystream_size`]).
    Prevalidated(&'a ValidatedFractal),
    /// Render these parameters without screening. Width and height are
    /// replaced by the padded region size.
    Parameters(MandelbrotParameters),
}

/// Cipher image plus the key material that reverses it.
#[derive(Debug, Clone)]
pub struct Encrypted {
    pub image: RgbaImage,
    pub key_material: KeyMaterial,
}

pub struct CipherEngine {
    generator: FractalGenerator,
    buckets: SegmentBuckets,
}

impl CipherEngine {
    pub fn new(generator: FractalGenerator, buckets: SegmentBuckets) -> Self {
        Self { generator, buckets }
    }

    pub fn from_config(config: &FlkConfig) -> FlkResult<Self> {
        Ok(Self::new(
            FractalGenerator::from_config(&config.generator)?,
            SegmentBuckets::from(&config.segmentation),
        ))
    }

    pub fn generator(&self) -> &FractalGenerator {
        &self.generator
    }

    /// Padded region size, i.e. the keystream size `area` needs.
    pub fn keystream_size(&self, area: &EncryptionArea) -> FlkResult<(u32, u32)> {
        let segment = self.buckets.segment_size_for(area.width, area.height);
        Ok((padded_len(area.width, segment)?, padded_len(area.height, segment)?))
    }

    /// Encrypt with a freshly searched keystream.
    pub fn encrypt(
        &self,
        image: &RgbaImage,
        area: &EncryptionArea,
        seed: &MasterSeed,
        cancel: &CancellationToken,
    ) -> FlkResult<Encrypted> {
        self.encrypt_with(
            image,
            area,
            seed,
            KeystreamSource::Search {
                cancel,
                progress: None,
            },
        )
    }

    /// Any decoded image; converted to RGBA8 first.
    pub fn encrypt_dynamic(
        &self,
        image: &DynamicImage,
        area: &EncryptionArea,
        seed: &MasterSeed,
        keystream: KeystreamSource<'_>,
    ) -> FlkResult<Encrypted> {
        self.encrypt_with(&image.to_rgba8(), area, seed, keystream)
    }

    pub fn encrypt_with(
        &self,
        image: &RgbaImage,
        area: &EncryptionArea,
        seed: &MasterSeed,
        keystream: KeystreamSource<'_>,
    ) -> FlkResult<Encrypted> {
        let (width, height) = image.dimensions();
        area.validate_within(width, height)?;

        let region = imageops::crop_imm(image, area.start_x, area.start_y, area.width, area.height)
            .to_image();
        let mut rng = DeterministicRandomSource::new(seed);
        let shuffled = segment_and_shuffle(&region, &mut rng, &self.buckets)?;
        let (padded_w, padded_h) = (shuffled.params.padded_width, shuffled.params.padded_height);

        let (fractal, mandelbrot) = match keystream {
            KeystreamSource::Search { cancel, progress } => {
                let found = self
                    .generator
                    .generate_validated(padded_w, padded_h, cancel, progress)?;
                (found.image, found.params)
            }
            KeystreamSource::Prevalidated(found) => {
                if found.image.dimensions() != (padded_w, padded_h)
                    || (found.params.width, found.params.height) != (padded_w, padded_h)
                {
                    return Err(FlkError::Validation(format!(
                        "keystream is {}x{}, padded region is {padded_w}x{padded_h}",
                        found.image.width(),
                        found.image.height()
                    )));
                }
                (found.image.clone(), found.params)
            }
            KeystreamSource::Parameters(params) => {
                let params = MandelbrotParameters {
                    width: padded_w,
                    height: padded_h,
                    ..params
                };
                (self.generator.generate(&params)?, params)
            }
        };

        let cipher_region = xor_rgb(&shuffled.image, &fractal)?;
        let cipher = splice_with_gutter(image, area, &cipher_region)?;

        info!(
            width,
            height,
            area_width = area.width,
            area_height = area.height,
            segment_size = shuffled.params.segment_size,
            "image encrypted"
        );
        Ok(Encrypted {
            image: cipher,
            key_material: KeyMaterial {
                area: *area,
                segmentation: shuffled.params,
                mandelbrot,
                sealed_seed: None,
            },
        })
    }

    pub fn decrypt(&self, cipher: &RgbaImage, key_material: &KeyMaterial) -> FlkResult<RgbaImage> {
        key_material.validate()?;
        let area = &key_material.area;
        let seg = &key_material.segmentation;
        let (padded_w, padded_h) = (seg.padded_width, seg.padded_height);

        let (cipher_w, cipher_h) = cipher.dimensions();
        let fits = u64::from(area.start_x) + u64::from(padded_w) <= u64::from(cipher_w)
            && u64::from(area.start_y) + u64::from(padded_h) <= u64::from(cipher_h);
        if !fits {
            return Err(FlkError::Validation(format!(
                "cipher image {cipher_w}x{cipher_h} cannot hold a {padded_w}x{padded_h} region at ({}, {})",
                area.start_x, area.start_y
            )));
        }
        let width = cipher_w - (padded_w - area.width);
        let height = cipher_h - (padded_h - area.height);
        area.validate_within(width, height)?;

        let region = imageops::crop_imm(cipher, area.start_x, area.start_y, padded_w, padded_h)
            .to_image();
        let fractal = self.generator.generate(&key_material.mandelbrot)?;
        let shuffled = xor_rgb(&region, &fractal)?;
        let padded = unshuffle(&shuffled, seg)?;

        let (sx, sy) = (area.start_x, area.start_y);
        let (end_x, end_y) = (sx + area.width, sy + area.height);
        let plain = RgbaImage::from_fn(width, height, |x, y| {
            if (sx..end_x).contains(&x) && (sy..end_y).contains(&y) {
                *padded.get_pixel(x - sx, y - sy)
            } else {
                *cipher.get_pixel(
                    past_gutter(x, end_x, padded_w - area.width),
                    past_gutter(y, end_y, padded_h - area.height),
                )
            }
        });

        info!(width, height, "image decrypted");
        Ok(plain)
    }
}

/// XOR the RGB channels of `data` with `keystream`; alpha is kept from `data`.
pub fn xor_rgb(data: &RgbaImage, keystream: &RgbaImage) -> FlkResult<RgbaImage> {
    if data.dimensions() != keystream.dimensions() {
        return Err(FlkError::Validation(format!(
            "image {}x{} and keystream {}x{} differ in size",
            data.width(),
            data.height(),
            keystream.width(),
            keystream.height()
        )));
    }

    let mut out = data.clone();
    let key = keystream.as_raw();
    out.par_chunks_mut(4)
        .zip(key.par_chunks(4))
        .for_each(|(px, k)| {
            px[0] ^= k[0];
            px[1] ^= k[1];
            px[2] ^= k[2];
        });
    Ok(out)
}

/// Source coordinate → cipher coordinate along one axis.
fn past_gutter(pos: u32, area_end: u32, gutter: u32) -> u32 {
    if pos < area_end {
        pos
    } else {
        pos + gutter
    }
}

/// Cipher coordinate → source coordinate, or `None` inside the gutter.
fn before_gutter(pos: u32, area_end: u32, gutter: u32) -> Option<u32> {
    if pos < area_end {
        Some(pos)
    } else if pos < area_end + gutter {
        None
    } else {
        Some(pos - gutter)
    }
}

fn splice_with_gutter(
    image: &RgbaImage,
    area: &EncryptionArea,
    region: &RgbaImage,
) -> FlkResult<RgbaImage> {
    let (region_w, region_h) = region.dimensions();
    let gutter_x = region_w - area.width;
    let gutter_y = region_h - area.height;
    let out_w = image
        .width()
        .checked_add(gutter_x)
        .ok_or_else(|| FlkError::Validation("cipher image width overflows".into()))?;
    let out_h = image
        .height()
        .checked_add(gutter_y)
        .ok_or_else(|| FlkError::Validation("cipher image height overflows".into()))?;

    let (sx, sy) = (area.start_x, area.start_y);
    let (end_x, end_y) = (sx + area.width, sy + area.height);

    Ok(RgbaImage::from_fn(out_w, out_h, |x, y| {
        if (sx..sx + region_w).contains(&x) && (sy..sy + region_h).contains(&y) {
            return *region.get_pixel(x - sx, y - sy);
        }
        match (
            before_gutter(x, end_x, gutter_x),
            before_gutter(y, end_y, gutter_y),
        ) {
            (Some(src_x), Some(src_y)) => *image.get_pixel(src_x, src_y),
            _ => TRANSPARENT,
        }
    }))
}
