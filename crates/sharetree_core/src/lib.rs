//! # Sharetree Core
//!
//! The replicated element tree and the per-peer sync context.
//!
//! This crate provides:
//! - `ElementTree`, an id-keyed arena of scalar, array and object elements
//! - `ElementFactory`, the tag-keyed element constructor registry
//! - `SyncContext`, which turns local mutations into operations and applies
//!   remote ones after transforming them against queued local work
//! - A pending buffer for remote operations that arrive before the element
//!   they need
//! - Element listeners and channel subscriptions
//! - Snapshot export and restore
//! - `SharedContext`, a lock-protected handle for other threads

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod element;
mod engine;
mod error;
mod factory;
mod listener;
mod pending;
mod shared;
mod snapshot;
mod stats;
mod tree;

pub use config::ContextConfig;
pub use context::{AppliedRemote, ChildKey, ErrorHook, OwnerFilter, SyncContext};
pub use element::{Element, ElementBody};
pub use error::{CoreError, CoreResult};
pub use factory::{ElementFactory, ElementMaker};
pub use listener::{ElementEvent, ElementListener, ListenerId};
pub use shared::SharedContext;
pub use snapshot::{snapshot, SnapshotNode};
pub use stats::{ContextStats, ContextStatsSnapshot};
pub use tree::{ElementTree, NodeView, ROOT_NAME};
