//! Bounds-checked big-endian wire reader.

use crate::error::{CodecError, CodecResult};
use crate::value::{TypedValue, ValueKind};
use crate::writer::NO_VALUE_TAG;

/// Maximum allowed string length.
/// This prevents allocation-based DoS from untrusted input.
pub const MAX_STRING_LENGTH: u64 = 16 * 1024 * 1024;

/// Maximum allowed element count for length-prefixed sequences.
pub const MAX_SEQUENCE_ELEMENTS: u64 = 1024 * 1024;

/// Reads fixed-width big-endian fields from a byte slice.
///
/// Every read checks the remaining length first and fails with
/// [`CodecError::UnexpectedEof`] instead of panicking on short input.
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a new reader for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Capacity to reserve for `count` items of at least `min_size` bytes
    /// each, bounded by what the unread input could hold.
    pub fn capacity_for(&self, count: usize, min_size: usize) -> usize {
        count.min(self.remaining().len() / min_size.max(1))
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fails if any bytes are left unread.
    pub fn finish(&self) -> CodecResult<()> {
        let remaining = self.remaining().len();
        if remaining > 0 {
            return Err(CodecError::TrailingBytes { remaining });
        }
        Ok(())
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads `len` raw bytes.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a one-byte bool; any byte other than 0 or 1 is rejected.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::invalid_structure(format!(
                "bool byte must be 0 or 1, got {other}"
            ))),
        }
    }

    /// Reads a 2-byte unsigned integer.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a 4-byte unsigned integer.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a 4-byte signed integer.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Reads an 8-byte unsigned integer.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Reads an 8-byte signed integer.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Reads a 4-byte float.
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Reads an 8-byte float.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// Reads a 4-byte sequence count, enforcing [`MAX_SEQUENCE_ELEMENTS`].
    pub fn read_len(&mut self) -> CodecResult<usize> {
        let len = u64::from(self.read_u32()?);
        if len > MAX_SEQUENCE_ELEMENTS {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_SEQUENCE_ELEMENTS,
            });
        }
        usize::try_from(len).map_err(|_| CodecError::invalid_structure("length overflows usize"))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> CodecResult<String> {
        let len = u64::from(self.read_u32()?);
        if len > MAX_STRING_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_STRING_LENGTH,
            });
        }
        let len =
            usize::try_from(len).map_err(|_| CodecError::invalid_structure("length overflows usize"))?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads the payload of a value whose kind tag was already consumed.
    pub fn read_value_of(&mut self, kind: ValueKind) -> CodecResult<TypedValue> {
        Ok(match kind {
            ValueKind::Bool => TypedValue::Bool(self.read_bool()?),
            ValueKind::Int32 => TypedValue::Int32(self.read_i32()?),
            ValueKind::Int64 => TypedValue::Int64(self.read_i64()?),
            ValueKind::Float32 => TypedValue::Float32(self.read_f32()?),
            ValueKind::Float64 => TypedValue::Float64(self.read_f64()?),
            ValueKind::String => TypedValue::String(self.read_str()?),
        })
    }

    /// Reads a kind tag followed by a value payload.
    pub fn read_value(&mut self) -> CodecResult<TypedValue> {
        let tag = self.read_u8()?;
        let kind = ValueKind::from_code(tag).ok_or(CodecError::unknown_tag("value kind", tag))?;
        self.read_value_of(kind)
    }

    /// Reads an optional value written by
    /// [`WireWriter::put_optional_value`](crate::WireWriter::put_optional_value).
    pub fn read_optional_value(&mut self) -> CodecResult<Option<TypedValue>> {
        let tag = self.read_u8()?;
        if tag == NO_VALUE_TAG {
            return Ok(None);
        }
        let kind = ValueKind::from_code(tag).ok_or(CodecError::unknown_tag("value kind", tag))?;
        self.read_value_of(kind).map(Some)
    }
}
