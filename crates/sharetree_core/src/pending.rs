//! Operations waiting for an element that has not arrived yet.
//!
//! With more than two peers an operation can overtake the Create of the
//! element it needs. Such operations are parked under the missing id and
//! released when that element is created. Each parked operation has a
//! budget of retry ticks; when it runs out the operation is reported as a
//! consistency error.

use sharetree_protocol::{ElementId, Operation, PeerRank};
use std::collections::HashMap;

/// A parked operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingOp {
    pub(crate) op: Operation,
    pub(crate) from: PeerRank,
    pub(crate) ticks_left: u32,
}

/// Parked operations keyed by the id they wait for.
#[derive(Debug, Default)]
pub(crate) struct PendingBuffer {
    waiting: HashMap<ElementId, Vec<PendingOp>>,
    len: usize,
    capacity: usize,
    budget: u32,
}

impl PendingBuffer {
    pub(crate) fn new(capacity: usize, budget: u32) -> Self {
        Self {
            waiting: HashMap::new(),
            len: 0,
            capacity,
            budget,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Parks `op` under `missing`. Hands the operation back if the buffer
    /// is full.
    pub(crate) fn park(
        &mut self,
        missing: ElementId,
        op: Operation,
        from: PeerRank,
    ) -> Result<(), (Operation, PeerRank)> {
        if self.len >= self.capacity {
            return Err((op, from));
        }
        self.waiting.entry(missing).or_default().push(PendingOp {
            op,
            from,
            ticks_left: self.budget,
        });
        self.len += 1;
        Ok(())
    }

    /// Removes and returns everything waiting for `id`, in arrival order.
    pub(crate) fn take(&mut self, id: ElementId) -> Vec<PendingOp> {
        let ops = self.waiting.remove(&id).unwrap_or_default();
        self.len -= ops.len();
        ops
    }

    /// Spends one tick of every parked operation's budget and returns
    /// the ones that ran out.
    pub(crate) fn tick(&mut self) -> Vec<PendingOp> {
        let mut expired = Vec::new();
        self.waiting.retain(|_, ops| {
            let mut kept = Vec::with_capacity(ops.len());
            for mut pending in ops.drain(..) {
                pending.ticks_left = pending.ticks_left.saturating_sub(1);
                if pending.ticks_left == 0 {
                    expired.push(pending);
                } else {
                    kept.push(pending);
                }
            }
            *ops = kept;
            !ops.is_empty()
        });
        self.len -= expired.len();
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharetree_protocol::{AuthorityLevel, SystemId};

    fn rank() -> PeerRank {
        PeerRank::new(AuthorityLevel::Low, SystemId::new(7).unwrap())
    }

    fn id(n: u64) -> ElementId {
        ElementId::from_raw(n)
    }

    fn delete(n: u64) -> Operation {
        Operation::delete(id(n), AuthorityLevel::Low, vec![id(1)])
    }

    #[test]
    fn park_and_take() {
        let mut buffer = PendingBuffer::new(8, 3);
        buffer.park(id(1), delete(10), rank()).unwrap();
        buffer.park(id(1), delete(11), rank()).unwrap();
        buffer.park(id(2), delete(12), rank()).unwrap();
        assert_eq!(buffer.len(), 3);

        let released = buffer.take(id(1));
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].op.target, id(10));
        assert_eq!(released[1].op.target, id(11));
        assert_eq!(buffer.len(), 1);
        assert!(buffer.take(id(1)).is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut buffer = PendingBuffer::new(1, 3);
        buffer.park(id(1), delete(10), rank()).unwrap();
        let (rejected, _) = buffer.park(id(1), delete(11), rank()).unwrap_err();
        assert_eq!(rejected.target, id(11));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn budget_expires_after_ticks() {
        let mut buffer = PendingBuffer::new(8, 2);
        buffer.park(id(1), delete(10), rank()).unwrap();
        assert!(buffer.tick().is_empty());
        let expired = buffer.tick();
        assert_eq!(expired.len(), 1);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.take(id(1)).is_empty());
    }
}
