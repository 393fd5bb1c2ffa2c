//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding wire bytes.
///
/// Every decoding failure of a message received from a peer surfaces as one
/// of these variants. The offending message is dropped by the caller; the
/// channel itself stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A tag byte did not name any known variant.
    #[error("unknown {what} tag: {tag}")]
    UnknownTag {
        /// What kind of tag was being read.
        what: &'static str,
        /// The offending byte.
        tag: u8,
    },

    /// Invalid wire structure.
    #[error("invalid wire structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A length prefix exceeded the allowed maximum.
    #[error("size limit exceeded: claimed {claimed}, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// The length claimed by the input.
        claimed: u64,
        /// The maximum allowed length.
        max_allowed: u64,
    },

    /// Bytes were left over after a complete message was decoded.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an unknown tag error.
    pub fn unknown_tag(what: &'static str, tag: u8) -> Self {
        Self::UnknownTag { what, tag }
    }
}
