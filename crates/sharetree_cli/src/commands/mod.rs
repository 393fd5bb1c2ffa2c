//! CLI command implementations.

pub mod decode;
pub mod simulate;

use thiserror::Error;

/// Failures reported by the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The input was not valid hex.
    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The bytes did not decode.
    #[error("decode failed: {0}")]
    Protocol(#[from] sharetree_protocol::ProtocolError),

    /// A local tree edit failed.
    #[error("edit failed: {0}")]
    Core(#[from] sharetree_core::CoreError),

    /// A simulated peer failed.
    #[error("sync failed: {0}")]
    Sync(#[from] sharetree_sync_engine::SyncError),

    /// Output could not be rendered.
    #[error("output failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A simulated peer task panicked or was cancelled.
    #[error("peer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A command argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Peers did not end with the same tree.
    #[error("peers diverged: {0}")]
    Diverged(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
