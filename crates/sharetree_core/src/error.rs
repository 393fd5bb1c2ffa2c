//! Error types for Sharetree core.

use sharetree_codec::CodecError;
use sharetree_protocol::{ElementId, ProtocolError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Sharetree core operations.
///
/// `DuplicateName`, `NotFound`, `IndexOutOfRange` and `KindMismatch` are
/// returned synchronously to application code that misuses the local API;
/// the tree is left unchanged. `Consistency` is never returned to a caller:
/// it is reported through the context's error hook when a remote operation
/// cannot be resolved.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A sibling with this name already exists.
    #[error("duplicate name '{name}' under {parent}")]
    DuplicateName {
        /// The parent object.
        parent: ElementId,
        /// The clashing name.
        name: String,
    },

    /// Element not found.
    #[error("element not found: {element}")]
    NotFound {
        /// Description of the missing element.
        element: String,
    },

    /// Array index outside the valid range.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The array length.
        len: usize,
    },

    /// Element or value of the wrong kind.
    #[error("kind mismatch: expected {expected}, found {actual}")]
    KindMismatch {
        /// The expected kind.
        expected: String,
        /// The kind found.
        actual: String,
    },

    /// No element constructor registered for the tag.
    #[error("unknown element kind: {tag}")]
    UnknownKind {
        /// The unregistered tag.
        tag: u8,
    },

    /// A remote operation could not be resolved.
    #[error("consistency error applying {op}: {reason}")]
    Consistency {
        /// Description of the operation.
        op: String,
        /// Why it could not be applied.
        reason: String,
    },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates a not found error for an id.
    pub fn not_found(id: ElementId) -> Self {
        Self::NotFound {
            element: id.to_string(),
        }
    }

    /// Creates a not found error for a named child.
    pub fn child_not_found(parent: ElementId, name: &str) -> Self {
        Self::NotFound {
            element: format!("'{name}' under {parent}"),
        }
    }

    /// Creates a kind mismatch error.
    pub fn kind_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::KindMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Creates a consistency error.
    pub fn consistency(op: impl ToString, reason: impl Into<String>) -> Self {
        Self::Consistency {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by misuse of the local API.
    pub fn is_local_misuse(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. }
                | Self::NotFound { .. }
                | Self::IndexOutOfRange { .. }
                | Self::KindMismatch { .. }
        )
    }
}
