//! # Sharetree Testkit
//!
//! Test utilities for Sharetree.
//!
//! This crate provides:
//! - Context and manager fixtures
//! - Property-based test generators using proptest
//! - An in-memory network of sync managers that delivers messages between
//!   them step by step
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sharetree_testkit::prelude::*;
//!
//! #[test]
//! fn two_peers_converge() {
//!     let mut net = TestNetwork::pair(AuthorityLevel::High, AuthorityLevel::Low);
//!     net.run_until_synced(32);
//!     net.assert_converged();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod network;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::network::*;
    pub use sharetree_protocol::AuthorityLevel;
}

pub use fixtures::*;
pub use generators::*;
pub use network::*;
