//! Big-endian wire writer.

use crate::error::{CodecError, CodecResult};
use crate::value::TypedValue;
use bytes::{BufMut, Bytes, BytesMut};

/// Tag written in an optional value slot that holds no value.
pub const NO_VALUE_TAG: u8 = 0;

/// Appends fixed-width big-endian fields to a growable buffer.
///
/// Strings are written as a 4-byte length followed by their UTF-8 bytes.
/// Values are written as a 1-byte kind tag followed by the payload.
pub struct WireWriter {
    buffer: BytesMut,
}

impl WireWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Consume this writer and return the encoded bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes one byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buffer.put_u8(v);
    }

    /// Writes a bool as one byte.
    pub fn put_bool(&mut self, v: bool) {
        self.buffer.put_u8(u8::from(v));
    }

    /// Writes a 2-byte unsigned integer.
    pub fn put_u16(&mut self, v: u16) {
        self.buffer.put_u16(v);
    }

    /// Writes a 4-byte unsigned integer.
    pub fn put_u32(&mut self, v: u32) {
        self.buffer.put_u32(v);
    }

    /// Writes a 4-byte signed integer.
    pub fn put_i32(&mut self, v: i32) {
        self.buffer.put_i32(v);
    }

    /// Writes an 8-byte unsigned integer.
    pub fn put_u64(&mut self, v: u64) {
        self.buffer.put_u64(v);
    }

    /// Writes an 8-byte signed integer.
    pub fn put_i64(&mut self, v: i64) {
        self.buffer.put_i64(v);
    }

    /// Writes a 4-byte float.
    pub fn put_f32(&mut self, v: f32) {
        self.buffer.put_f32(v);
    }

    /// Writes an 8-byte float.
    pub fn put_f64(&mut self, v: f64) {
        self.buffer.put_f64(v);
    }

    /// Writes a collection length as a 4-byte count.
    pub fn put_len(&mut self, len: usize) -> CodecResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| CodecError::encoding_failed(format!("length {len} exceeds u32")))?;
        self.buffer.put_u32(len);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) -> CodecResult<()> {
        self.put_len(s.len())?;
        self.buffer.put_slice(s.as_bytes());
        Ok(())
    }

    /// Writes a kind tag followed by the value payload.
    pub fn put_value(&mut self, value: &TypedValue) -> CodecResult<()> {
        self.buffer.put_u8(value.kind().to_code());
        match value {
            TypedValue::Bool(b) => self.put_bool(*b),
            TypedValue::Int32(n) => self.put_i32(*n),
            TypedValue::Int64(n) => self.put_i64(*n),
            TypedValue::Float32(n) => self.put_f32(*n),
            TypedValue::Float64(n) => self.put_f64(*n),
            TypedValue::String(s) => self.put_str(s)?,
        }
        Ok(())
    }

    /// Writes an optional value; `None` is the single byte [`NO_VALUE_TAG`].
    pub fn put_optional_value(&mut self, value: Option<&TypedValue>) -> CodecResult<()> {
        match value {
            Some(v) => self.put_value(v),
            None => {
                self.buffer.put_u8(NO_VALUE_TAG);
                Ok(())
            }
        }
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}
