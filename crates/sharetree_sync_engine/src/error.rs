//! Error types for the sync engine.

use crate::peer::PeerId;
use sharetree_codec::CodecError;
use sharetree_core::CoreError;
use sharetree_protocol::{ProtocolError, SystemId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The channel failed to deliver bytes.
    #[error("channel error: {message}")]
    Channel {
        /// Error message.
        message: String,
        /// Whether the send can be retried.
        retryable: bool,
    },

    /// No connection with this peer id.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// A connection with this peer id already exists.
    #[error("peer {0} is already connected")]
    DuplicatePeer(PeerId),

    /// The remote announced a system id already in use.
    #[error("system id {system} is already in use")]
    DuplicateSystemId {
        /// The clashing id.
        system: SystemId,
    },

    /// Version mismatch.
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Local protocol version.
        local: u16,
        /// Remote protocol version.
        remote: u16,
    },

    /// Malformed message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Encoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Local tree error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Creates a retryable channel error.
    pub fn channel_retryable(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable channel error.
    pub fn channel_fatal(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Channel { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::channel_retryable("busy").is_retryable());
        assert!(!SyncError::channel_fatal("closed").is_retryable());
        assert!(!SyncError::UnknownPeer(PeerId(3)).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::VersionMismatch { local: 1, remote: 2 };
        assert!(err.to_string().contains("local=1"));
        assert!(err.to_string().contains("remote=2"));

        let err = SyncError::DuplicatePeer(PeerId(7));
        assert_eq!(err.to_string(), "peer 7 is already connected");
    }
}
