//! # Sharetree Sync Engine
//!
//! Link management and operation exchange for Sharetree.
//!
//! This crate provides:
//! - `SyncManager`, which drives one context against any number of peers
//! - The identity handshake with duplicate system id and version checks
//! - Catch-up of newly connected peers from the current tree
//! - Relaying of applied remote operations between peers
//! - Cleanup of user-owned data when a link closes
//! - `SyncChannel`, the byte transport seam, with mock and tokio channel
//!   implementations
//!
//! ## Architecture
//!
//! Nothing here blocks or spawns. The application feeds received bytes in
//! with `on_bytes_received` and calls `update` periodically; every message
//! the manager produces goes out through its channel. All mutation of the
//! tree happens inside `update` under the context lock.
//!
//! ## Key Invariants
//!
//! - Operations on a link are applied in the order they were generated
//! - Every peer that has seen the same operations holds the same tree
//! - Nothing is exchanged on a link before both identities are accepted
//! - Links form a tree: with a cycle, relayed changes arrive twice

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod manager;
mod peer;

pub use channel::{MockChannel, MpscChannel, SyncChannel};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use manager::{SyncManager, SyncStats, UpdateResult};
pub use peer::{LinkState, PeerId};
