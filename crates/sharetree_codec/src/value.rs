//! Typed primitive values carried by elements and operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a [`TypedValue`].
///
/// The discriminant is the byte written on the wire ahead of the payload.
/// Tag `0` is reserved for "no value" in optional value slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    /// Boolean.
    Bool = 1,
    /// 32-bit signed integer.
    Int32 = 2,
    /// 64-bit signed integer.
    Int64 = 3,
    /// 32-bit float.
    Float32 = 4,
    /// 64-bit float.
    Float64 = 5,
    /// UTF-8 string.
    String = 6,
}

impl ValueKind {
    /// Converts to the wire tag.
    pub fn to_code(self) -> u8 {
        self as u8
    }

    /// Converts from a wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Bool),
            2 => Some(Self::Int32),
            3 => Some(Self::Int64),
            4 => Some(Self::Float32),
            5 => Some(Self::Float64),
            6 => Some(Self::String),
            _ => None,
        }
    }

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive value held by a leaf element, an array slot, or an operation.
///
/// Two values are equal iff they have the same kind and the same payload.
/// Floats compare by bit pattern, so `NaN` equals an identical `NaN` and
/// `0.0` differs from `-0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
}

impl TypedValue {
    /// Returns the kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::Float32(_) => ValueKind::Float32,
            Self::Float64(_) => ValueKind::Float64,
            Self::String(_) => ValueKind::String,
        }
    }

    /// Returns the zero value of a kind.
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Int32 => Self::Int32(0),
            ValueKind::Int64 => Self::Int64(0),
            ValueKind::Float32 => Self::Float32(0.0),
            ValueKind::Float64 => Self::Float64(0.0),
            ValueKind::String => Self::String(String::new()),
        }
    }

    /// Returns the value as a bool if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an i32 if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as an f32 if it is one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float32(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as an f64 if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float32(a), Self::Float32(b)) => a.to_bits() == b.to_bits(),
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::Float32(n) => write!(f, "{n}"),
            Self::Float64(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<f32> for TypedValue {
    fn from(n: f32) -> Self {
        Self::Float32(n)
    }
}

impl From<f64> for TypedValue {
    fn from(n: f64) -> Self {
        Self::Float64(n)
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_same_kind() {
        assert_eq!(TypedValue::Int32(5), TypedValue::Int32(5));
        assert_ne!(TypedValue::Int32(5), TypedValue::Int64(5));
        assert_ne!(TypedValue::Float32(1.0), TypedValue::Float64(1.0));
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(TypedValue::Float64(f64::NAN), TypedValue::Float64(f64::NAN));
        assert_ne!(TypedValue::Float32(0.0), TypedValue::Float32(-0.0));
    }

    #[test]
    fn kind_codes_roundtrip() {
        for code in 1..=6 {
            let kind = ValueKind::from_code(code).unwrap();
            assert_eq!(kind.to_code(), code);
        }
        assert!(ValueKind::from_code(0).is_none());
        assert!(ValueKind::from_code(7).is_none());
    }

    #[test]
    fn default_matches_kind() {
        for code in 1..=6 {
            let kind = ValueKind::from_code(code).unwrap();
            assert_eq!(TypedValue::default_for(kind).kind(), kind);
        }
    }

    #[test]
    fn display_renders_payload() {
        assert_eq!(TypedValue::Int32(-3).to_string(), "-3");
        assert_eq!(TypedValue::Bool(true).to_string(), "true");
        assert_eq!(TypedValue::from("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn accessors() {
        assert_eq!(TypedValue::from(7i64).as_i64(), Some(7));
        assert_eq!(TypedValue::from(7i64).as_i32(), None);
        assert_eq!(TypedValue::from("x").as_str(), Some("x"));
        assert_eq!(TypedValue::from(2.5f32).as_f32(), Some(2.5));
    }
}
