//! Binary codec layer: fixed-width little-endian integers, a variable-length
//! "dynamic int", length-prefixed strings/paths, packed dates, and
//! nanosecond timestamps — the primitives records are built from.
//!
//! Grounded on the original `uint8_utils.h`/`records.h` codec split: values
//! are read and written at explicit offsets, and a variable-length value's
//! encoded length can always be recovered from its own leading bytes. Rust
//! expresses the "offset" part of that design as a cursor threaded through
//! [`Encoder`]/[`Decoder`] rather than a separate buffer-plus-field-list
//! indirection: advancing the cursor by a value's encoded length *is*
//! `parse_offsets()`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kb_digest::DigestResult;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of buffer (need {need} bytes at offset {offset}, have {len})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        len: usize,
    },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown record type byte {0}")]
    UnknownRecordType(u8),
}

/// Variable-length integer: 1/2/4 bytes chosen by value range.
///
/// `0xxxxxxx` (1 byte, 0..=127), `10xxxxxx xxxxxxxx` (2 bytes, 128..=16383),
/// `11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx` (4 bytes, 16384..=1073741823).
pub mod dynamic_int {
    use super::CodecError;

    pub const MAX1: u32 = 0b0111_1111;
    pub const MAX2: u32 = 0b0011_1111_1111_1111;
    pub const MAX3: u32 = 0b0011_1111_1111_1111_1111_1111_1111_1111;

    const LENGTH1_MASK: u8 = 0b1000_0000;
    const LENGTH2_MASK: u8 = 0b1100_0000;

    const UINT16_MASK: u16 = 0b1000_0000_0000_0000;
    const UINT32_MASK: u32 = 0b1100_0000_0000_0000_0000_0000_0000_0000;

    /// Number of bytes `v` encodes to.
    pub fn encoded_len(v: u32) -> usize {
        if v > MAX2 {
            4
        } else if v > MAX1 {
            2
        } else {
            1
        }
    }

    pub fn encode(v: u32, out: &mut Vec<u8>) {
        if v > MAX2 {
            let u32v = v | UINT32_MASK;
            out.extend_from_slice(&u32v.to_be_bytes());
        } else if v > MAX1 {
            let u16v = (v as u16) | UINT16_MASK;
            out.extend_from_slice(&u16v.to_be_bytes());
        } else {
            out.push(v as u8);
        }
    }

    /// Decode from the start of `buf`, returning the value and its encoded length.
    pub fn decode(buf: &[u8]) -> Result<(u32, usize), CodecError> {
        let first = *buf.first().ok_or(CodecError::UnexpectedEof {
            offset: 0,
            need: 1,
            len: 0,
        })?;
        if first & LENGTH2_MASK == LENGTH2_MASK {
            if buf.len() < 4 {
                return Err(CodecError::UnexpectedEof {
                    offset: 0,
                    need: 4,
                    len: buf.len(),
                });
            }
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&buf[..4]);
            let v = u32::from_be_bytes(bytes) & MAX3;
            Ok((v, 4))
        } else if first & LENGTH1_MASK == LENGTH1_MASK {
            if buf.len() < 2 {
                return Err(CodecError::UnexpectedEof {
                    offset: 0,
                    need: 2,
                    len: buf.len(),
                });
            }
            let mut bytes = [0u8; 2];
            bytes.copy_from_slice(&buf[..2]);
            let v = (u16::from_be_bytes(bytes) & (MAX2 as u16)) as u32;
            Ok((v, 2))
        } else {
            Ok((first as u32, 1))
        }
    }
}

/// A calendar date packed as `YYYY*10000 + MM*100 + DD`; `0` means invalid/unset.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct YearMonthDay {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl YearMonthDay {
    pub fn to_u32(self) -> u32 {
        if self.month == 0 || self.month > 12 || self.day == 0 || self.day > 31 {
            return 0;
        }
        self.year as u32 * 10000 + self.month as u32 * 100 + self.day as u32
    }

    pub fn from_u32(packed: u32) -> Option<Self> {
        if packed == 0 {
            return None;
        }
        let day = (packed % 100) as u8;
        let rest = packed / 100;
        let month = (rest % 100) as u8;
        let year = (rest / 100) as u16;
        Some(YearMonthDay { year, month, day })
    }
}

/// Append-only byte buffer writer for record encoding.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_dyn_int(&mut self, v: u32) {
        dynamic_int::encode(v, &mut self.buf);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_dyn_int(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_path(&mut self, p: &Path) {
        self.write_str(&p.to_string_lossy());
    }

    pub fn write_date(&mut self, date: YearMonthDay) {
        self.write_u32_le(date.to_u32());
    }

    pub fn write_timestamp(&mut self, ts: SystemTime) {
        let nanos = ts
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos() as u64;
        self.write_u64_le(nanos);
    }

    pub fn write_digest(&mut self, digest: &DigestResult) {
        self.buf.extend_from_slice(digest.as_bytes());
    }
}

/// Sequential reader over a borrowed byte slice, tracking its own cursor.
///
/// Advancing the cursor after each read is the Rust analog of
/// `parse_offsets()`: the next field's offset is always "wherever the
/// previous field's bytes ended".
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn require(&self, need: usize) -> Result<(), CodecError> {
        if self.pos + need > self.buf.len() {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                need,
                len: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        self.require(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        self.require(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.require(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_dyn_int(&mut self) -> Result<u32, CodecError> {
        self.require(1)?;
        let (v, len) = dynamic_int::decode(&self.buf[self.pos..])?;
        self.pos += len;
        Ok(v)
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_dyn_int()? as usize;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_path(&mut self) -> Result<PathBuf, CodecError> {
        Ok(PathBuf::from(self.read_str()?))
    }

    pub fn read_date(&mut self) -> Result<Option<YearMonthDay>, CodecError> {
        Ok(YearMonthDay::from_u32(self.read_u32_le()?))
    }

    pub fn read_timestamp(&mut self) -> Result<SystemTime, CodecError> {
        let nanos = self.read_u64_le()?;
        Ok(UNIX_EPOCH + Duration::from_nanos(nanos))
    }

    pub fn read_digest(&mut self, len: usize) -> Result<DigestResult, CodecError> {
        let raw = self.read_raw(len)?;
        Ok(DigestResult::from_bytes(raw.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_int_round_trip_and_widths() {
        for v in [0u32, 1, 126, 127, 128, 16383, 16384, 1_073_741_823] {
            let mut buf = Vec::new();
            dynamic_int::encode(v, &mut buf);
            let expected_len = match v {
                0..=127 => 1,
                128..=16383 => 2,
                _ => 4,
            };
            assert_eq!(buf.len(), expected_len, "width mismatch for {v}");
            let (decoded, len) = dynamic_int::decode(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(len, expected_len);
        }
    }

    #[test]
    fn string_round_trip() {
        let mut enc = Encoder::new();
        enc.write_str("hello krico");
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_str().unwrap(), "hello krico");
        assert_eq!(dec.position(), bytes.len());
    }

    #[test]
    fn date_round_trip() {
        let d = YearMonthDay {
            year: 2026,
            month: 7,
            day: 27,
        };
        let mut enc = Encoder::new();
        enc.write_date(d);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_date().unwrap(), Some(d));
    }

    #[test]
    fn invalid_date_packs_zero() {
        let d = YearMonthDay {
            year: 0,
            month: 0,
            day: 0,
        };
        assert_eq!(d.to_u32(), 0);
        assert_eq!(YearMonthDay::from_u32(0), None);
    }

    #[test]
    fn timestamp_round_trip() {
        let ts = UNIX_EPOCH + Duration::new(1_753_000_000, 123_456_789);
        let mut enc = Encoder::new();
        enc.write_timestamp(ts);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_timestamp().unwrap(), ts);
    }

    #[test]
    fn decoder_reports_eof() {
        let bytes = [0x10u8];
        let mut dec = Decoder::new(&bytes);
        assert!(dec.read_u32_le().is_err());
    }
}
