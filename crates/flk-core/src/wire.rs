//! Fixed-width big-endian field encoding shared by the key-material blob and
//! sealed envelopes.
//!
//! Every read names the field it was reading so a truncated blob reports
//! *where* it ran out instead of silently yielding zeros.

use crate::error::{FlkError, FlkResult};

/// Cursor over a byte slice that fails with `FlkError::Deserialization`.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize, field: &str) -> FlkResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(FlkError::Deserialization(format!(
                "truncated at {field}: need {len} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self, field: &str) -> FlkResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, field)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &str) -> FlkResult<u8> {
        Ok(self.read_array::<1>(field)?[0])
    }

    pub fn read_bool(&mut self, field: &str) -> FlkResult<bool> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FlkError::Deserialization(format!(
                "{field}: expected boolean byte 0 or 1, got {other}"
            ))),
        }
    }

    pub fn read_u32(&mut self, field: &str) -> FlkResult<u32> {
        Ok(u32::from_be_bytes(self.read_array(field)?))
    }

    /// Signed 32-bit field that must not be negative.
    pub fn read_non_negative(&mut self, field: &str) -> FlkResult<u32> {
        let value = i32::from_be_bytes(self.read_array(field)?);
        u32::try_from(value).map_err(|_| {
            FlkError::Deserialization(format!("{field}: negative value {value}"))
        })
    }

    pub fn read_f64(&mut self, field: &str) -> FlkResult<f64> {
        Ok(f64::from_be_bytes(self.read_array(field)?))
    }

    /// `len(4) bytes...` framed field.
    pub fn read_len_prefixed(&mut self, field: &str) -> FlkResult<&'a [u8]> {
        let len = self.read_non_negative(field)? as usize;
        self.read_bytes(len, field)
    }

    pub fn finish(self, what: &str) -> FlkResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(FlkError::Deserialization(format!(
                "{} trailing bytes after {what}",
                self.remaining()
            )))
        }
    }
}

pub fn put_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

/// Counterpart of [`WireReader::read_non_negative`]: rejects values above `i32::MAX`.
pub fn put_non_negative(out: &mut Vec<u8>, value: u32, field: &str) -> FlkResult<()> {
    let value = i32::try_from(value).map_err(|_| {
        FlkError::Validation(format!("{field}: {value} does not fit a signed 32-bit field"))
    })?;
    out.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

pub fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> FlkResult<()> {
    let len = i32::try_from(bytes.len()).map_err(|_| {
        FlkError::Validation(format!("field of {} bytes is too long to frame", bytes.len()))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields_in_order() {
        let mut buf = Vec::new();
        put_bool(&mut buf, true);
        put_non_negative(&mut buf, 0x0102_0304, "n").unwrap();
        put_f64(&mut buf, -0.75);
        put_len_prefixed(&mut buf, b"abc").unwrap();
        assert_eq!(&buf[1..5], &[1, 2, 3, 4]);

        let mut r = WireReader::new(&buf);
        assert!(r.read_bool("flag").unwrap());
        assert_eq!(r.read_u32("n").unwrap(), 0x0102_0304);
        assert_eq!(r.read_f64("x").unwrap(), -0.75);
        assert_eq!(r.read_len_prefixed("blob").unwrap(), b"abc");
        r.finish("test record").unwrap();
    }

    #[test]
    fn truncation_names_the_field() {
        let mut r = WireReader::new(&[0, 0]);
        let err = r.read_u32("paddedWidth").unwrap_err();
        assert!(matches!(err, FlkError::Deserialization(_)));
        assert!(err.to_string().contains("paddedWidth"));
    }

    #[test]
    fn negative_length_is_rejected() {
        let buf = (-1i32).to_be_bytes();
        let mut r = WireReader::new(&buf);
        assert!(r.read_len_prefixed("ivLen").is_err());
    }

    #[test]
    fn non_negative_fields_stay_in_signed_range() {
        let mut buf = Vec::new();
        put_non_negative(&mut buf, i32::MAX as u32, "max").unwrap();
        assert!(put_non_negative(&mut buf, i32::MAX as u32 + 1, "too big").is_err());
        assert_eq!(buf.len(), 4);
        assert_eq!(WireReader::new(&buf).read_non_negative("max").unwrap(), i32::MAX as u32);
    }

    #[test]
    fn invalid_bool_byte_is_rejected() {
        let mut r = WireReader::new(&[7]);
        assert!(r.read_bool("isWhole").is_err());
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let mut r = WireReader::new(&[1, 2]);
        r.read_u8("first").unwrap();
        assert!(r.finish("record").is_err());
    }
}
