//! # Sharetree Codec
//!
//! Fixed-width binary encoding for Sharetree.
//!
//! All multi-byte integers and floats are big-endian. Strings are a 4-byte
//! length followed by UTF-8 bytes. A [`TypedValue`] is a 1-byte kind tag
//! followed by its payload (bool 1 byte, int32/float32 4 bytes,
//! int64/float64 8 bytes, string length-prefixed).
//!
//! ## Usage
//!
//! ```
//! use sharetree_codec::{from_wire_bytes, to_wire_bytes, TypedValue};
//!
//! let value = TypedValue::Int32(42);
//! let bytes = to_wire_bytes(&value).unwrap();
//! let decoded: TypedValue = from_wire_bytes(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod reader;
mod value;
mod writer;

pub use bytes::Bytes;
pub use error::{CodecError, CodecResult};
pub use reader::{WireReader, MAX_SEQUENCE_ELEMENTS, MAX_STRING_LENGTH};
pub use value::{TypedValue, ValueKind};
pub use writer::{WireWriter, NO_VALUE_TAG};

/// Trait for types that can be written to the wire.
pub trait Encode {
    /// Append this value's wire form to `writer`.
    fn encode_to(&self, writer: &mut WireWriter) -> CodecResult<()>;
}

/// Trait for types that can be read from the wire.
pub trait Decode: Sized {
    /// Read one value from `reader`, leaving any following bytes unread.
    fn decode_from(reader: &mut WireReader<'_>) -> CodecResult<Self>;
}

/// Encode a value into a fresh buffer.
///
/// # Errors
///
/// Returns an error if a length does not fit the 4-byte prefix.
pub fn to_wire_bytes<T: Encode + ?Sized>(value: &T) -> CodecResult<Bytes> {
    let mut writer = WireWriter::new();
    value.encode_to(&mut writer)?;
    Ok(writer.into_bytes())
}

/// Decode a value that must span the whole input.
///
/// # Errors
///
/// Returns an error if the bytes are malformed or not fully consumed.
pub fn from_wire_bytes<T: Decode>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = WireReader::new(bytes);
    let value = T::decode_from(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

impl Encode for TypedValue {
    fn encode_to(&self, writer: &mut WireWriter) -> CodecResult<()> {
        writer.put_value(self)
    }
}

impl Decode for TypedValue {
    fn decode_from(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        reader.read_value()
    }
}
