//! Error types for the protocol crate.

use sharetree_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding operations and messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No constructor is registered for the tag.
    #[error("unknown operation kind: {tag}")]
    UnknownKind {
        /// The unregistered tag.
        tag: u8,
    },

    /// Malformed bytes.
    #[error("decode error: {0}")]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    /// Returns true if the error stems from malformed input.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Codec(_))
    }
}
