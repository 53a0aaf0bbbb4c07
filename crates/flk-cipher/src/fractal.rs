//! Mandelbrot keystream rendering and the screened parameter search.
//!
//! Rendering splits the rows into one stripe per pool thread. Each worker
//! owns a disjoint slice of the pixel buffer so no locking is involved; the
//! caller blocks until every stripe is done and sees the first failure.
//! A stripe fails when a pixel maps to a non-finite plane coordinate, which
//! finite parameters can still produce at extreme zoom/offset combinations.

use image::RgbaImage;
use rand::Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use flk_core::config::GeneratorConfig;
use flk_core::{FlkError, FlkResult, MandelbrotParameters};

use crate::quality::{QualityReport, QualityThresholds};

pub const ZOOM_MIN: f64 = 100_000.0;
pub const ZOOM_MAX: f64 = 144_000.0;
pub const MAX_ITER_MIN: u32 = 500;
pub const MAX_ITER_MAX: u32 = 1400;
pub const MAX_ITER_STEP: u32 = 10;
pub const OFFSET_LIMIT: f64 = 0.9998;

/// Bytes per RGBA pixel
const CHANNELS: usize = 4;

/// |z|² at which a point counts as escaped
const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Ranges random keystream parameters are drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSpace {
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub max_iter_min: u32,
    pub max_iter_max: u32,
    pub max_iter_step: u32,
    pub offset_limit: f64,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            zoom_min: ZOOM_MIN,
            zoom_max: ZOOM_MAX,
            max_iter_min: MAX_ITER_MIN,
            max_iter_max: MAX_ITER_MAX,
            max_iter_step: MAX_ITER_STEP,
            offset_limit: OFFSET_LIMIT,
        }
    }
}

impl From<&GeneratorConfig> for SearchSpace {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            zoom_min: config.zoom_min,
            zoom_max: config.zoom_max,
            max_iter_min: config.max_iter_min,
            max_iter_max: config.max_iter_max,
            max_iter_step: config.max_iter_step,
            offset_limit: config.offset_limit,
        }
    }
}

impl SearchSpace {
    pub fn validate(&self) -> FlkResult<()> {
        let zoom_ok = self.zoom_min.is_finite()
            && self.zoom_max.is_finite()
            && self.zoom_min > 0.0
            && self.zoom_min <= self.zoom_max;
        let iter_ok = self.max_iter_step > 0
            && self.max_iter_min > 0
            && self.max_iter_min <= self.max_iter_max;
        let offset_ok = self.offset_limit.is_finite() && self.offset_limit > 0.0;
        if zoom_ok && iter_ok && offset_ok {
            Ok(())
        } else {
            Err(FlkError::Validation(format!("invalid search space: {self:?}")))
        }
    }

    /// Draw one parameter set for a `width` x `height` keystream.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> FlkResult<MandelbrotParameters> {
        self.validate()?;
        let steps = (self.max_iter_max - self.max_iter_min) / self.max_iter_step;
        Ok(MandelbrotParameters {
            width,
            height,
            zoom: rng.gen_range(self.zoom_min..=self.zoom_max),
            offset_x: rng.gen_range(-self.offset_limit..=self.offset_limit),
            offset_y: rng.gen_range(-self.offset_limit..=self.offset_limit),
            max_iterations: self.max_iter_min + rng.gen_range(0..=steps) * self.max_iter_step,
        })
    }
}

/// A keystream that passed the diversity screen, with the parameters that
/// reproduce it.
#[derive(Debug, Clone)]
pub struct ValidatedFractal {
    pub image: RgbaImage,
    pub params: MandelbrotParameters,
    pub report: QualityReport,
    /// Attempts made, including the accepted one
    pub attempts: u32,
}

/// Called with (attempt number, report) after each rejected attempt.
pub type ProgressFn<'a> = &'a (dyn Fn(u32, &QualityReport) + Sync);

pub struct FractalGenerator {
    pool: ThreadPool,
    search: SearchSpace,
    thresholds: QualityThresholds,
    max_attempts: u32,
}

impl FractalGenerator {
    /// `workers == 0` sizes the pool to the available parallelism.
    pub fn new(workers: usize) -> FlkResult<Self> {
        let threads = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("flk-fractal-{i}"))
            .build()
            .map_err(|e| FlkError::Generation(format!("failed to start worker pool: {e}")))?;

        Ok(Self {
            pool,
            search: SearchSpace::default(),
            thresholds: QualityThresholds::default(),
            max_attempts: 0,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> FlkResult<Self> {
        Ok(Self::new(config.workers)?
            .with_search_space(SearchSpace::from(config))?
            .with_thresholds(QualityThresholds::from(config))
            .with_max_attempts(config.max_attempts))
    }

    pub fn with_search_space(mut self, search: SearchSpace) -> FlkResult<Self> {
        search.validate()?;
        self.search = search;
        Ok(self)
    }

    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// 0 keeps searching until accepted or cancelled.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Render the keystream for `params`. Same parameters, same bytes,
    /// regardless of worker count.
    pub fn generate(&self, params: &MandelbrotParameters) -> FlkResult<RgbaImage> {
        params.validate()?;

        let width = params.width as usize;
        let height = params.height as usize;
        let row_bytes = width
            .checked_mul(CHANNELS)
            .ok_or_else(|| FlkError::Validation("fractal width overflows".into()))?;
        let total = row_bytes
            .checked_mul(height)
            .ok_or_else(|| FlkError::Validation("fractal size overflows".into()))?;

        let mut buf = vec![0u8; total];
        let stripes = self.workers().clamp(1, height);
        let rows_per_stripe = height.div_ceil(stripes);

        self.pool.install(|| {
            buf.par_chunks_mut(rows_per_stripe * row_bytes)
                .enumerate()
                .try_for_each(|(i, stripe)| render_stripe(params, i * rows_per_stripe, stripe))
        })?;

        RgbaImage::from_raw(params.width, params.height, buf)
            .ok_or_else(|| FlkError::Generation("pixel buffer does not match dimensions".into()))
    }

    /// Draw random parameters until a keystream passes the diversity screen.
    pub fn generate_validated(
        &self,
        width: u32,
        height: u32,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> FlkResult<ValidatedFractal> {
        self.generate_validated_with(width, height, &mut rand::thread_rng(), cancel, progress)
    }

    /// [`generate_validated`](Self::generate_validated) with a caller-supplied RNG.
    ///
    /// Attempts run one after another. Cancellation is checked before each
    /// attempt; an attempt already rendering runs to completion and is dropped.
    pub fn generate_validated_with<R: Rng + ?Sized>(
        &self,
        width: u32,
        height: u32,
        rng: &mut R,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> FlkResult<ValidatedFractal> {
        if width == 0 || height == 0 {
            return Err(FlkError::Validation(format!(
                "keystream dimensions must be positive, got {width}x{height}"
            )));
        }

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                debug!(attempts, "keystream search cancelled");
                return Err(FlkError::Cancelled);
            }
            if self.max_attempts != 0 && attempts >= self.max_attempts {
                return Err(FlkError::Generation(format!(
                    "no keystream passed the diversity screen in {attempts} attempts"
                )));
            }
            attempts += 1;

            let params = self.search.sample(width, height, rng)?;
            let image = self.generate(&params)?;
            let report = QualityReport::measure(&image);

            if report.accepts(&self.thresholds) {
                info!(
                    attempts,
                    width,
                    height,
                    unique_colors = report.unique_colors,
                    "keystream accepted"
                );
                return Ok(ValidatedFractal {
                    image,
                    params,
                    report,
                    attempts,
                });
            }

            debug!(
                attempt = attempts,
                unique_colors = report.unique_colors,
                max_color_share = report.max_color_share,
                black_fraction = report.black_fraction,
                "keystream rejected"
            );
            if let Some(report_progress) = progress {
                report_progress(attempts, &report);
            }
        }
    }
}

fn render_stripe(params: &MandelbrotParameters, first_row: usize, stripe: &mut [u8]) -> FlkResult<()> {
    let row_bytes = params.width as usize * CHANNELS;
    let half_w = f64::from(params.width) / 2.0;
    let half_h = f64::from(params.height) / 2.0;

    for (dy, row) in stripe.chunks_exact_mut(row_bytes).enumerate() {
        let y = first_row + dy;
        let cy = (y as f64 - half_h) / params.zoom + params.offset_y;

        for (x, px) in row.chunks_exact_mut(CHANNELS).enumerate() {
            let cx = (x as f64 - half_w) / params.zoom + params.offset_x;
            if !cx.is_finite() || !cy.is_finite() {
                return Err(FlkError::Generation(format!(
                    "non-finite coordinate at pixel ({x}, {y})"
                )));
            }
            let [r, g, b] = escape_color(escape_time(cx, cy, params.max_iterations));
            px.copy_from_slice(&[r, g, b, u8::MAX]);
        }
    }
    Ok(())
}

/// Iterations of z ← z² + c before |z|² reaches 4, or `None` if it never does.
fn escape_time(cx: f64, cy: f64, max_iterations: u32) -> Option<u32> {
    let (mut zx, mut zy) = (0.0f64, 0.0f64);
    for i in 0..max_iterations {
        let zx2 = zx * zx;
        let zy2 = zy * zy;
        if zx2 + zy2 >= ESCAPE_RADIUS_SQ {
            return Some(i);
        }
        zy = 2.0 * zx * zy + cy;
        zx = zx2 - zy2 + cx;
    }
    None
}

/// `i | i<<10 | i<<14` as 0xRRGGBB; points inside the set are black.
fn escape_color(escaped: Option<u32>) -> [u8; 3] {
    match escaped {
        Some(i) => {
            let rgb = (i | (i << 10) | (i << 14)) & 0x00FF_FFFF;
            [(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]
        }
        None => [0, 0, 0],
    }
}
