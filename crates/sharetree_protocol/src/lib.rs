//! # Sharetree Protocol
//!
//! Replication protocol types for Sharetree.
//!
//! This crate provides:
//! - Element, system and user identifiers
//! - Authority levels and the peer ranking used to break ties
//! - `Operation`, the record of one tree mutation, with its wire codec
//! - `OperationFactory`, the tag-keyed decoder registry
//! - `TransformManager`, the pairwise operational transform table
//! - `LinkOplog`, the versioned per-link operation log
//! - Peer messages (identity, change batches)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod error;
mod factory;
mod ids;
mod kind;
mod messages;
mod operation;
mod oplog;
mod transform;

pub use authority::{AuthorityLevel, PeerRank};
pub use error::{ProtocolError, ProtocolResult};
pub use factory::{OpHeader, OperationFactory, OperationMaker};
pub use ids::{ElementId, IdGenerator, SystemId, UserId};
pub use kind::ElementKind;
pub use messages::{IdentityInfo, SyncMessage, PROTOCOL_VERSION};
pub use operation::{ElementSeed, OpBody, Operation, OperationType};
pub use oplog::{LinkOplog, OperationalState, Sequence, VersionedOp};
pub use transform::{Ranks, TransformFn, TransformManager, TransformedPair};
