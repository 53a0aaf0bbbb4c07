//! Binary key material: everything needed to reverse the shuffle and the XOR.
//!
//! Layout, all integers big-endian signed 32-bit and never negative, doubles
//! IEEE-754 binary64:
//!
//! ```text
//! isWhole(1) startX(4) startY(4) width(4) height(4)
//! segmentSize(4) paddedWidth(4) paddedHeight(4)
//! mappingCount(4) [key(4) value(4)] × mappingCount
//! mandelbrotWidth(4) mandelbrotHeight(4) zoom(8) offsetX(8) offsetY(8) maxIter(4)
//! [ivLen(4) iv  saltLen(4) salt  cipherLen(4) cipher]      optional sealed master seed
//! ```
//!
//! Mapping entries are `key = destination block, value = source block`.

use flk_core::types::blocks_along;
use flk_core::wire::{put_bool, put_f64, put_non_negative, WireReader};
use flk_core::{EncryptionArea, FlkError, FlkResult, MandelbrotParameters, SegmentationParameters};
use flk_crypto::{CryptoSession, MasterSeed, SealedBox};

/// Bytes per mapping entry
const MAPPING_ENTRY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct KeyMaterial {
    pub area: EncryptionArea,
    pub segmentation: SegmentationParameters,
    pub mandelbrot: MandelbrotParameters,
    /// Master seed sealed under a caller secret, when embedded
    pub sealed_seed: Option<SealedBox>,
}

impl KeyMaterial {
    /// Cross-field consistency: padded sizes follow from the area, the
    /// keystream covers the padded region, the mapping is a bijection.
    pub fn validate(&self) -> FlkResult<()> {
        let area = &self.area;
        let seg = &self.segmentation;
        if area.width == 0 || area.height == 0 {
            return Err(FlkError::Validation("area must have positive dimensions".into()));
        }
        if area.is_whole && (area.start_x != 0 || area.start_y != 0) {
            return Err(FlkError::Validation(
                "whole-image area must start at the origin".into(),
            ));
        }
        seg.validate()?;

        let expected_w = u64::from(blocks_along(area.width, seg.segment_size)) * u64::from(seg.segment_size);
        let expected_h = u64::from(blocks_along(area.height, seg.segment_size)) * u64::from(seg.segment_size);
        if (u64::from(seg.padded_width), u64::from(seg.padded_height)) != (expected_w, expected_h) {
            return Err(FlkError::Validation(format!(
                "padded size {}x{} does not match area {}x{} at segment size {}",
                seg.padded_width, seg.padded_height, area.width, area.height, seg.segment_size
            )));
        }

        self.mandelbrot.validate()?;
        if (self.mandelbrot.width, self.mandelbrot.height) != (seg.padded_width, seg.padded_height) {
            return Err(FlkError::Validation(format!(
                "keystream is {}x{}, padded region is {}x{}",
                self.mandelbrot.width, self.mandelbrot.height, seg.padded_width, seg.padded_height
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> FlkResult<Vec<u8>> {
        let area = &self.area;
        let seg = &self.segmentation;
        let m = &self.mandelbrot;

        let mut out = Vec::with_capacity(85 + seg.mapping.len() * MAPPING_ENTRY);
        put_bool(&mut out, area.is_whole);
        put_non_negative(&mut out, area.start_x, "startX")?;
        put_non_negative(&mut out, area.start_y, "startY")?;
        put_non_negative(&mut out, area.width, "width")?;
        put_non_negative(&mut out, area.height, "height")?;

        put_non_negative(&mut out, seg.segment_size, "segmentSize")?;
        put_non_negative(&mut out, seg.padded_width, "paddedWidth")?;
        put_non_negative(&mut out, seg.padded_height, "paddedHeight")?;
        let count = u32::try_from(seg.mapping.len())
            .map_err(|_| FlkError::Validation("mapping too large".into()))?;
        put_non_negative(&mut out, count, "mappingCount")?;
        for (dst, &src) in seg.mapping.iter().enumerate() {
            put_non_negative(&mut out, dst as u32, "mapping key")?;
            put_non_negative(&mut out, src, "mapping value")?;
        }

        put_non_negative(&mut out, m.width, "mandelbrotWidth")?;
        put_non_negative(&mut out, m.height, "mandelbrotHeight")?;
        put_f64(&mut out, m.zoom);
        put_f64(&mut out, m.offset_x);
        put_f64(&mut out, m.offset_y);
        put_non_negative(&mut out, m.max_iterations, "maxIter")?;

        if let Some(sealed) = &self.sealed_seed {
            sealed.write_to(&mut out)?;
        }
        Ok(out)
    }

    /// Parse and check a key material blob. Truncation, trailing garbage, and
    /// internally inconsistent fields are all deserialization errors.
    pub fn from_bytes(data: &[u8]) -> FlkResult<Self> {
        let mut r = WireReader::new(data);

        let area = EncryptionArea {
            is_whole: r.read_bool("isWhole")?,
            start_x: r.read_non_negative("startX")?,
            start_y: r.read_non_negative("startY")?,
            width: r.read_non_negative("width")?,
            height: r.read_non_negative("height")?,
        };

        let segment_size = r.read_non_negative("segmentSize")?;
        let padded_width = r.read_non_negative("paddedWidth")?;
        let padded_height = r.read_non_negative("paddedHeight")?;
        let count = r.read_non_negative("mappingCount")? as usize;
        if count.saturating_mul(MAPPING_ENTRY) > r.remaining() {
            return Err(FlkError::Deserialization(format!(
                "mappingCount {count} exceeds the {} bytes left",
                r.remaining()
            )));
        }

        let mut mapping = vec![None; count];
        for _ in 0..count {
            let key = r.read_non_negative("mapping key")? as usize;
            let value = r.read_non_negative("mapping value")?;
            let slot = mapping.get_mut(key).ok_or_else(|| {
                FlkError::Deserialization(format!("mapping key {key} out of range 0..{count}"))
            })?;
            if slot.replace(value).is_some() {
                return Err(FlkError::Deserialization(format!(
                    "mapping key {key} appears twice"
                )));
            }
        }
        // Every key 0..count was filled exactly once by the loop above.
        let mapping: Vec<u32> = mapping.into_iter().flatten().collect();

        let mandelbrot = MandelbrotParameters {
            width: r.read_non_negative("mandelbrotWidth")?,
            height: r.read_non_negative("mandelbrotHeight")?,
            zoom: r.read_f64("zoom")?,
            offset_x: r.read_f64("offsetX")?,
            offset_y: r.read_f64("offsetY")?,
            max_iterations: r.read_non_negative("maxIter")?,
        };

        let sealed_seed = if r.is_empty() {
            None
        } else {
            Some(SealedBox::read_from(&mut r)?)
        };
        r.finish("key material")?;

        let material = KeyMaterial {
            area,
            segmentation: SegmentationParameters {
                segment_size,
                padded_width,
                padded_height,
                mapping,
            },
            mandelbrot,
            sealed_seed,
        };
        material
            .validate()
            .map_err(|e| FlkError::Deserialization(format!("inconsistent key material: {e}")))?;
        Ok(material)
    }

    /// Embed `seed` sealed under `secret`.
    pub fn seal_seed(
        &mut self,
        seed: &MasterSeed,
        secret: &[u8],
        session: &CryptoSession,
    ) -> FlkResult<()> {
        self.sealed_seed = Some(session.seal(seed.as_bytes(), secret)?);
        Ok(())
    }

    /// Recover the embedded seed, if there is one.
    pub fn open_seed(&self, secret: &[u8], session: &CryptoSession) -> FlkResult<Option<MasterSeed>> {
        let Some(sealed) = &self.sealed_seed else {
            return Ok(None);
        };
        let bytes = session.open(sealed, secret)?;
        MasterSeed::from_slice(&bytes)
            .map(Some)
            .ok_or_else(|| FlkError::Deserialization(format!(
                "sealed seed is {} bytes, expected 32",
                bytes.len()
            )))
    }
}

/// Protect a whole key material blob at rest.
pub fn seal_key_material(
    material: &KeyMaterial,
    secret: &[u8],
    session: &CryptoSession,
) -> FlkResult<Vec<u8>> {
    session.seal(&material.to_bytes()?, secret)?.to_bytes()
}

pub fn open_key_material(
    sealed: &[u8],
    secret: &[u8],
    session: &CryptoSession,
) -> FlkResult<KeyMaterial> {
    let envelope = SealedBox::from_bytes(sealed)?;
    KeyMaterial::from_bytes(&session.open(&envelope, secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flk_crypto::KdfParams;
    use proptest::prelude::*;

    fn sample() -> KeyMaterial {
        KeyMaterial {
            area: EncryptionArea::partial(3, 5, 7, 4),
            segmentation: SegmentationParameters {
                segment_size: 4,
                padded_width: 8,
                padded_height: 4,
                mapping: vec![1, 0],
            },
            mandelbrot: MandelbrotParameters {
                width: 8,
                height: 4,
                zoom: 123_456.0,
                offset_x: -0.5,
                offset_y: 0.25,
                max_iterations: 730,
            },
            sealed_seed: None,
        }
    }

    fn session() -> CryptoSession {
        CryptoSession::new(KdfParams { iterations: 1000 })
    }

    #[test]
    fn layout_matches_field_order() {
        let bytes = sample().to_bytes().unwrap();
        // 1 + 8*4 header, 2 mapping entries, 4+4+8+8+8+4 fractal
        assert_eq!(bytes.len(), 33 + 16 + 36);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &3i32.to_be_bytes());
        assert_eq!(&bytes[5..9], &5i32.to_be_bytes());
        assert_eq!(&bytes[29..33], &2i32.to_be_bytes());
        // first entry: key 0 → value 1
        assert_eq!(&bytes[33..37], &0i32.to_be_bytes());
        assert_eq!(&bytes[37..41], &1i32.to_be_bytes());
        assert_eq!(&bytes[57..65], &123_456.0f64.to_be_bytes());
        assert_eq!(&bytes[81..85], &730i32.to_be_bytes());
    }

    #[test]
    fn decode_restores_fields() {
        let km = sample();
        assert_eq!(KeyMaterial::from_bytes(&km.to_bytes().unwrap()).unwrap(), km);
    }

    #[test]
    fn mapping_entries_may_arrive_in_any_order() {
        let km = sample();
        let mut bytes = km.to_bytes().unwrap();
        // swap the two 8-byte entries
        let (a, b) = bytes[33..49].split_at_mut(8);
        a.swap_with_slice(b);
        assert_eq!(KeyMaterial::from_bytes(&bytes).unwrap(), km);
    }

    #[test]
    fn every_truncation_is_an_error() {
        let bytes = sample().to_bytes().unwrap();
        for cut in 0..bytes.len() {
            let err = KeyMaterial::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, FlkError::Deserialization(_)), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn duplicate_mapping_key_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[41..45].copy_from_slice(&0i32.to_be_bytes());
        assert!(matches!(
            KeyMaterial::from_bytes(&bytes),
            Err(FlkError::Deserialization(_))
        ));
    }

    #[test]
    fn negative_field_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[1..5].copy_from_slice(&(-1i32).to_be_bytes());
        let err = KeyMaterial::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("startX"));
    }

    #[test]
    fn oversized_mapping_count_is_rejected_without_allocating() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[29..33].copy_from_slice(&i32::MAX.to_be_bytes());
        assert!(matches!(
            KeyMaterial::from_bytes(&bytes),
            Err(FlkError::Deserialization(_))
        ));
    }

    #[test]
    fn inconsistent_padding_is_rejected() {
        let mut km = sample();
        km.segmentation.padded_width = 12;
        km.segmentation.mapping = vec![0, 1, 2];
        km.mandelbrot.width = 12;
        let bytes = km.to_bytes().unwrap();
        assert!(matches!(
            KeyMaterial::from_bytes(&bytes),
            Err(FlkError::Deserialization(_))
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(KeyMaterial::from_bytes(&bytes).is_err());
    }

    #[test]
    fn sealed_seed_trailer_roundtrip() {
        let s = session();
        let seed = MasterSeed::from_bytes([0x5A; 32]);
        let mut km = sample();
        km.seal_seed(&seed, b"passphrase", &s).unwrap();

        let bytes = km.to_bytes().unwrap();
        assert_eq!(bytes.len(), 85 + 4 + 12 + 4 + 16 + 4 + 32 + 16);

        let decoded = KeyMaterial::from_bytes(&bytes).unwrap();
        let opened = decoded.open_seed(b"passphrase", &s).unwrap().unwrap();
        assert_eq!(opened.as_bytes(), seed.as_bytes());

        assert!(matches!(
            decoded.open_seed(b"wrong", &s),
            Err(FlkError::Integrity(_))
        ));
        assert!(sample().open_seed(b"passphrase", &s).unwrap().is_none());
    }

    #[test]
    fn sealed_blob_roundtrip() {
        let s = session();
        let km = sample();
        let sealed = seal_key_material(&km, b"secret", &s).unwrap();
        assert_eq!(open_key_material(&sealed, b"secret", &s).unwrap(), km);
        assert!(matches!(
            open_key_material(&sealed, b"other", &s),
            Err(FlkError::Integrity(_))
        ));
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = KeyMaterial::from_bytes(&data);
        }
    }
}
