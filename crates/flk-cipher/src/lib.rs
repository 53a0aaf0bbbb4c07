//! flk-cipher: image encryption with a Mandelbrot keystream
//!
//! Pipeline:
//! ```text
//! encrypt: image ─ crop area ─ pad to blocks ─ shuffle blocks (ChaCha20 seeded by master seed)
//!                  ─ XOR RGB with screened Mandelbrot keystream ─ splice back ─ cipher image
//!                  └── KeyMaterial { area, segment size, padded size, mapping, fractal params }
//!
//! decrypt: cipher image ─ crop padded region ─ XOR with re-rendered keystream
//!                  ─ unshuffle ─ drop padding ─ splice back ─ image
//! ```

pub mod engine;
pub mod fractal;
pub mod key_material;
pub mod quality;
pub mod random;
pub mod segment;

pub use engine::{CipherEngine, Encrypted, KeystreamSource};
pub use fractal::{FractalGenerator, SearchSpace, ValidatedFractal};
pub use key_material::{open_key_material, seal_key_material, KeyMaterial};
pub use quality::{QualityReport, QualityThresholds};
pub use random::DeterministicRandomSource;
pub use segment::{pad_to_multiple, segment_and_shuffle, unshuffle, SegmentBuckets, ShuffledImage};
