//! Versioned per-link operation log.
//!
//! Each link between two peers counts the operations sent and received
//! over it. Every outgoing operation is stamped with the link state at the
//! moment it was queued, which tells the receiver exactly which of its own
//! operations the sender had already seen.

use crate::authority::AuthorityLevel;
use crate::operation::Operation;
use std::collections::VecDeque;

/// Counts of operations exchanged over one link, from one side's view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationalState {
    /// Operations this side has sent.
    pub ops_sent: u32,
    /// Operations this side has received and processed.
    pub ops_received: u32,
}

impl OperationalState {
    /// Creates a state.
    pub fn new(ops_sent: u32, ops_received: u32) -> Self {
        Self {
            ops_sent,
            ops_received,
        }
    }
}

/// An operation stamped with the sender's link state.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedOp {
    /// Sender's state when the operation was queued.
    pub state: OperationalState,
    /// The operation.
    pub op: Operation,
}

impl VersionedOp {
    /// Creates a versioned operation.
    pub fn new(state: OperationalState, op: Operation) -> Self {
        Self { state, op }
    }
}

/// How an incoming operation relates to what this side already processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    /// The next expected operation.
    InOrder,
    /// Already processed; a duplicate delivery.
    Duplicate,
    /// Operations were lost before this one.
    Gap {
        /// The count this side expected.
        expected: u32,
        /// The count the sender reported.
        got: u32,
    },
}

/// The log of one link.
///
/// # Invariants
///
/// - `outstanding` is ordered by `ops_sent`
/// - `outstanding` holds the sent operations the remote has not yet seen,
///   rewritten by every transform against incoming operations
/// - `send_list` holds the queued operations exactly as generated
#[derive(Debug, Default)]
pub struct LinkOplog {
    local: OperationalState,
    remote: OperationalState,
    outstanding: VecDeque<VersionedOp>,
    send_list: Vec<VersionedOp>,
    last_acknowledged: u32,
}

impl LinkOplog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// This side's counts.
    pub fn state(&self) -> OperationalState {
        self.local
    }

    /// Last counts reported by the remote.
    pub fn remote_state(&self) -> OperationalState {
        self.remote
    }

    /// Queues an operation for sending and records it as outstanding.
    pub fn record_outgoing(&mut self, op: Operation) {
        let versioned = VersionedOp::new(self.local, op);
        self.send_list.push(versioned.clone());
        self.outstanding.push_back(versioned);
        self.local.ops_sent = self.local.ops_sent.wrapping_add(1);
    }

    /// Drops outstanding operations the remote has processed, according to
    /// the state stamped on a message from it. Returns how many were dropped.
    pub fn acknowledge(&mut self, remote: OperationalState) -> usize {
        let mut dropped = 0;
        while self
            .outstanding
            .front()
            .is_some_and(|front| front.state.ops_sent < remote.ops_received)
        {
            self.outstanding.pop_front();
            dropped += 1;
        }
        self.remote = remote;
        dropped
    }

    /// Classifies an incoming non-Ack operation against the receive count.
    pub fn check_sequence(&self, incoming: &VersionedOp) -> Sequence {
        let expected = self.local.ops_received;
        let got = incoming.state.ops_sent;
        if got == expected {
            Sequence::InOrder
        } else if got < expected {
            Sequence::Duplicate
        } else {
            Sequence::Gap { expected, got }
        }
    }

    /// Outstanding operations, oldest first, for transforming in place.
    pub fn outstanding_ops_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        self.outstanding.iter_mut().map(|entry| &mut entry.op)
    }

    /// Records that one incoming operation was processed.
    pub fn mark_received(&mut self) {
        self.local.ops_received = self.local.ops_received.wrapping_add(1);
    }

    /// Whether the remote should be told about received operations.
    pub fn needs_ack(&self) -> bool {
        self.last_acknowledged < self.local.ops_received
    }

    /// Takes up to `max` queued operations for sending. If nothing is queued
    /// but received operations are unacknowledged, an Ack is produced.
    pub fn take_batch(&mut self, max: usize, authority: AuthorityLevel) -> Vec<VersionedOp> {
        if self.send_list.is_empty() && self.needs_ack() {
            self.send_list
                .push(VersionedOp::new(self.local, Operation::ack(authority)));
        }
        let count = max.max(1).min(self.send_list.len());
        let batch: Vec<VersionedOp> = self.send_list.drain(..count).collect();
        if let Some(highest) = batch.iter().map(|v| v.state.ops_received).max() {
            self.last_acknowledged = self.last_acknowledged.max(highest);
        }
        batch
    }

    /// Number of outstanding operations.
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of operations queued but not yet taken.
    pub fn queued_len(&self) -> usize {
        self.send_list.len()
    }

    /// True when nothing is queued, nothing is unacknowledged on either side.
    pub fn is_settled(&self) -> bool {
        self.send_list.is_empty() && self.outstanding.is_empty() && !self.needs_ack()
    }

    /// Clears all state, as after a reconnect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ElementId;

    fn op(n: u64) -> Operation {
        Operation::delete(ElementId::from_raw(n), AuthorityLevel::Low, vec![])
    }

    #[test]
    fn outgoing_is_stamped_and_counted() {
        let mut log = LinkOplog::new();
        log.record_outgoing(op(1));
        log.record_outgoing(op(2));
        assert_eq!(log.state().ops_sent, 2);
        assert_eq!(log.outstanding_len(), 2);

        let batch = log.take_batch(10, AuthorityLevel::Low);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].state, OperationalState::new(0, 0));
        assert_eq!(batch[1].state, OperationalState::new(1, 0));
        assert_eq!(log.queued_len(), 0);
        assert_eq!(log.outstanding_len(), 2);
    }

    #[test]
    fn acknowledge_drops_seen_ops() {
        let mut log = LinkOplog::new();
        log.record_outgoing(op(1));
        log.record_outgoing(op(2));
        log.record_outgoing(op(3));

        assert_eq!(log.acknowledge(OperationalState::new(0, 2)), 2);
        assert_eq!(log.outstanding_len(), 1);
        assert_eq!(log.remote_state().ops_received, 2);
        assert_eq!(log.acknowledge(OperationalState::new(0, 2)), 0);
    }

    #[test]
    fn ack_sent_only_when_idle() {
        let mut log = LinkOplog::new();
        assert!(log.take_batch(10, AuthorityLevel::High).is_empty());

        log.mark_received();
        assert!(log.needs_ack());
        let batch = log.take_batch(10, AuthorityLevel::High);
        assert_eq!(batch.len(), 1);
        assert!(batch[0].op.is_ack());
        assert_eq!(batch[0].state.ops_received, 1);
        assert!(!log.needs_ack());
        assert_eq!(log.state().ops_sent, 0);
    }

    #[test]
    fn queued_ops_carry_the_ack() {
        let mut log = LinkOplog::new();
        log.mark_received();
        log.record_outgoing(op(1));
        let batch = log.take_batch(10, AuthorityLevel::Low);
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].op.is_ack());
        assert!(!log.needs_ack());
    }

    #[test]
    fn batch_respects_limit() {
        let mut log = LinkOplog::new();
        for n in 0..5 {
            log.record_outgoing(op(n));
        }
        assert_eq!(log.take_batch(2, AuthorityLevel::Low).len(), 2);
        assert_eq!(log.queued_len(), 3);
    }

    #[test]
    fn sequence_classification() {
        let mut log = LinkOplog::new();
        log.mark_received();
        let at = |sent| VersionedOp::new(OperationalState::new(sent, 0), op(1));
        assert_eq!(log.check_sequence(&at(1)), Sequence::InOrder);
        assert_eq!(log.check_sequence(&at(0)), Sequence::Duplicate);
        assert_eq!(
            log.check_sequence(&at(4)),
            Sequence::Gap {
                expected: 1,
                got: 4
            }
        );
    }

    #[test]
    fn settled_and_reset() {
        let mut log = LinkOplog::new();
        assert!(log.is_settled());
        log.record_outgoing(op(1));
        assert!(!log.is_settled());
        log.reset();
        assert!(log.is_settled());
        assert_eq!(log.state(), OperationalState::default());
    }
}
