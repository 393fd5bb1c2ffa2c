//! Context statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = ctx.stats().snapshot();
//! println!("applied {} remote ops", stats.remote_applied);
//! println!("{} consistency errors", stats.consistency_errors);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one sync context.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct ContextStats {
    /// Local mutations that produced an outbound operation.
    local_ops: AtomicU64,
    /// Remote operations that changed the tree.
    remote_applied: AtomicU64,
    /// Remote operations that were already reflected in the tree.
    remote_skipped: AtomicU64,
    /// Remote operations dropped because they lost a conflict or target a
    /// deleted element.
    remote_discarded: AtomicU64,
    /// Operations parked while waiting for a missing element.
    pending_parked: AtomicU64,
    /// Parked operations released after their element arrived.
    pending_released: AtomicU64,
    /// Remote operations that could not be resolved.
    consistency_errors: AtomicU64,
}

impl ContextStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_local_op(&self) {
        self.local_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.remote_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.remote_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.remote_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parked(&self) {
        self.pending_parked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self) {
        self.pending_released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consistency_error(&self) {
        self.consistency_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of local operations generated.
    pub fn local_ops(&self) -> u64 {
        self.local_ops.load(Ordering::Relaxed)
    }

    /// Returns the number of remote operations applied.
    pub fn remote_applied(&self) -> u64 {
        self.remote_applied.load(Ordering::Relaxed)
    }

    /// Returns the number of consistency errors reported.
    pub fn consistency_errors(&self) -> u64 {
        self.consistency_errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> ContextStatsSnapshot {
        ContextStatsSnapshot {
            local_ops: self.local_ops(),
            remote_applied: self.remote_applied(),
            remote_skipped: self.remote_skipped.load(Ordering::Relaxed),
            remote_discarded: self.remote_discarded.load(Ordering::Relaxed),
            pending_parked: self.pending_parked.load(Ordering::Relaxed),
            pending_released: self.pending_released.load(Ordering::Relaxed),
            consistency_errors: self.consistency_errors(),
        }
    }
}

/// Point-in-time copy of [`ContextStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStatsSnapshot {
    /// Local mutations that produced an outbound operation.
    pub local_ops: u64,
    /// Remote operations that changed the tree.
    pub remote_applied: u64,
    /// Remote operations already reflected in the tree.
    pub remote_skipped: u64,
    /// Remote operations dropped.
    pub remote_discarded: u64,
    /// Operations parked for a missing element.
    pub pending_parked: u64,
    /// Parked operations released.
    pub pending_released: u64,
    /// Unresolvable remote operations.
    pub consistency_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ContextStats::new();
        stats.record_local_op();
        stats.record_local_op();
        stats.record_applied();
        stats.record_consistency_error();

        let snap = stats.snapshot();
        assert_eq!(snap.local_ops, 2);
        assert_eq!(snap.remote_applied, 1);
        assert_eq!(snap.consistency_errors, 1);
        assert_eq!(snap.remote_discarded, 0);
    }
}
