//! Element kind tags.

use serde::{Deserialize, Serialize};
use sharetree_codec::ValueKind;
use std::fmt;

/// The kind of an element in the tree.
///
/// The discriminant is the tag written in `Create` payloads and used as the
/// key of the element factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementKind {
    /// Boolean leaf.
    Bool = 1,
    /// 32-bit integer leaf.
    Int32 = 2,
    /// 64-bit integer leaf.
    Int64 = 3,
    /// 32-bit float leaf.
    Float32 = 4,
    /// 64-bit float leaf.
    Float64 = 5,
    /// String leaf.
    String = 6,
    /// Container of named children.
    Object = 7,
    /// Array of 32-bit integers.
    Int32Array = 8,
    /// Array of 32-bit floats.
    Float32Array = 9,
    /// Array of strings.
    StringArray = 10,
}

impl ElementKind {
    /// All kinds, in tag order.
    pub const ALL: [ElementKind; 10] = [
        Self::Bool,
        Self::Int32,
        Self::Int64,
        Self::Float32,
        Self::Float64,
        Self::String,
        Self::Object,
        Self::Int32Array,
        Self::Float32Array,
        Self::StringArray,
    ];

    /// Converts to the wire tag.
    pub fn to_code(self) -> u8 {
        self as u8
    }

    /// Converts from a wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code).checked_sub(1)?).copied()
    }

    /// Value kind held by a scalar leaf of this kind.
    pub fn scalar_value_kind(self) -> Option<ValueKind> {
        match self {
            Self::Bool => Some(ValueKind::Bool),
            Self::Int32 => Some(ValueKind::Int32),
            Self::Int64 => Some(ValueKind::Int64),
            Self::Float32 => Some(ValueKind::Float32),
            Self::Float64 => Some(ValueKind::Float64),
            Self::String => Some(ValueKind::String),
            _ => None,
        }
    }

    /// Value kind of the items of an array of this kind.
    pub fn array_item_kind(self) -> Option<ValueKind> {
        match self {
            Self::Int32Array => Some(ValueKind::Int32),
            Self::Float32Array => Some(ValueKind::Float32),
            Self::StringArray => Some(ValueKind::String),
            _ => None,
        }
    }

    /// Returns true for the container kind.
    pub fn is_object(self) -> bool {
        self == Self::Object
    }

    /// Returns true for array kinds.
    pub fn is_array(self) -> bool {
        self.array_item_kind().is_some()
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
            Self::Object => "object",
            Self::Int32Array => "int32[]",
            Self::Float32Array => "float32[]",
            Self::StringArray => "string[]",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_code(kind.to_code()), Some(kind));
        }
        assert_eq!(ElementKind::from_code(0), None);
        assert_eq!(ElementKind::from_code(11), None);
    }

    #[test]
    fn each_kind_is_exactly_one_shape() {
        for kind in ElementKind::ALL {
            let shapes = [
                kind.scalar_value_kind().is_some(),
                kind.is_array(),
                kind.is_object(),
            ];
            assert_eq!(shapes.iter().filter(|s| **s).count(), 1, "{kind}");
        }
    }
}
