//! Pairwise operational transforms.
//!
//! A transform takes a local operation `L` that has already been applied
//! locally and a remote operation `R` generated concurrently on a peer that
//! had not seen `L`. It returns `L'` and `R'` such that applying `R'` after
//! `L` yields the same tree as applying `L'` after `R`.
//!
//! Rules, in short:
//! - a Delete wins over every concurrent operation on its subtree;
//! - a Replace wins over every concurrent operation on the element it
//!   displaces;
//! - two Creates claiming the same name under the same parent keep the
//!   higher-ranked element, and the loser's side receives a Replace;
//! - concurrent writes to the same scalar or array slot keep the
//!   higher-ranked value;
//! - concurrent array inserts and removes shift each other's indices, and
//!   inserts at the same position are ordered higher rank first.

use crate::authority::PeerRank;
use crate::operation::{OpBody, Operation, OperationType};
use std::collections::HashMap;
use std::sync::Arc;

/// Ranks of the two peers on either side of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranks {
    /// The peer applying the transform.
    pub local: PeerRank,
    /// The peer the incoming operation came from.
    pub remote: PeerRank,
}

impl Ranks {
    /// Creates a rank pair.
    pub fn new(local: PeerRank, remote: PeerRank) -> Self {
        Self { local, remote }
    }

    /// Whether the remote side's operation takes precedence.
    pub fn remote_wins(&self) -> bool {
        self.remote > self.local
    }

    /// The same pair seen from the other peer.
    pub fn swapped(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

/// Result of transforming a local operation against a remote one.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedPair {
    /// Local operation, rewritten to apply after the remote one.
    pub local: Operation,
    /// Remote operation, rewritten to apply after the local one.
    pub remote: Operation,
}

impl TransformedPair {
    /// Creates a pair.
    pub fn new(local: Operation, remote: Operation) -> Self {
        Self { local, remote }
    }

    fn unchanged(local: &Operation, remote: &Operation) -> Self {
        Self::new(local.clone(), remote.clone())
    }

    fn swapped(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

/// A transform function registered for one `(local, remote)` type pair.
pub type TransformFn = Arc<dyn Fn(&Operation, &Operation, Ranks) -> TransformedPair + Send + Sync>;

/// Dispatch table from `(local type, remote type)` to transform function.
///
/// Pairs without an entry do not interfere and pass through unchanged.
#[derive(Clone)]
pub struct TransformManager {
    table: HashMap<(OperationType, OperationType), TransformFn>,
}

impl TransformManager {
    /// Creates a manager with no transforms.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Creates a manager with the built-in transforms registered.
    pub fn new() -> Self {
        use OperationType::{Create, Delete, Insert, Modify, Remove, Replace, Update};

        let mut manager = Self::empty();
        for other in [Create, Modify, Update, Insert, Remove, Replace] {
            manager.register_with_inverse(Delete, other, delete_wins);
        }
        manager.register(Delete, Delete, delete_delete);
        for other in [Modify, Update, Insert, Remove] {
            manager.register_with_inverse(Replace, other, replace_other);
        }
        manager.register_with_inverse(Replace, Delete, replace_delete);
        manager.register(Replace, Replace, replace_replace);
        manager.register_with_inverse(Create, Replace, create_replace);
        manager.register(Create, Create, create_create);
        manager.register(Modify, Modify, modify_modify);
        manager.register(Update, Update, update_update);
        manager.register_with_inverse(Update, Insert, update_insert);
        manager.register_with_inverse(Update, Remove, update_remove);
        manager.register(Insert, Insert, insert_insert);
        manager.register_with_inverse(Insert, Remove, insert_remove);
        manager.register(Remove, Remove, remove_remove);
        manager
    }

    /// Registers `f` for `(local, remote)`, replacing any existing entry.
    pub fn register<F>(&mut self, local: OperationType, remote: OperationType, f: F)
    where
        F: Fn(&Operation, &Operation, Ranks) -> TransformedPair + Send + Sync + 'static,
    {
        self.table.insert((local, remote), Arc::new(f));
    }

    /// Registers `f` for `(local, remote)` and its mirror for
    /// `(remote, local)`.
    pub fn register_with_inverse<F>(&mut self, local: OperationType, remote: OperationType, f: F)
    where
        F: Fn(&Operation, &Operation, Ranks) -> TransformedPair + Send + Sync + 'static,
    {
        let forward: TransformFn = Arc::new(f);
        let mirrored = Arc::clone(&forward);
        self.table.insert((local, remote), forward);
        if local != remote {
            self.table.insert(
                (remote, local),
                Arc::new(move |l: &Operation, r: &Operation, ranks: Ranks| {
                    mirrored(r, l, ranks.swapped()).swapped()
                }),
            );
        }
    }

    /// Returns whether a transform is registered for the pair.
    pub fn has_transform(&self, local: OperationType, remote: OperationType) -> bool {
        self.table.contains_key(&(local, remote))
    }

    /// Transforms one local operation against one remote operation.
    pub fn transform(&self, local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
        match self.table.get(&(local.op_type(), remote.op_type())) {
            Some(f) => f(local, remote, ranks),
            None => TransformedPair::unchanged(local, remote),
        }
    }

    /// Transforms `remote` against every operation in `outstanding`, in
    /// order, rewriting each outstanding operation in place.
    ///
    /// Stops early once the remote operation has become a Noop.
    pub fn transform_against<'a, I>(&self, outstanding: I, remote: Operation, ranks: Ranks) -> Operation
    where
        I: IntoIterator<Item = &'a mut Operation>,
    {
        let mut incoming = remote;
        for local in outstanding {
            if incoming.is_noop() || incoming.is_ack() {
                break;
            }
            let pair = self.transform(local, &incoming, ranks);
            *local = pair.local;
            incoming = pair.remote;
        }
        incoming
    }
}

impl Default for TransformManager {
    fn default() -> Self {
        Self::new()
    }
}

fn discard_both(local: &Operation, remote: &Operation) -> TransformedPair {
    TransformedPair::new(local.to_noop(), remote.to_noop())
}

fn keep_local(local: &Operation, remote: &Operation) -> TransformedPair {
    TransformedPair::new(local.clone(), remote.to_noop())
}

fn keep_remote(local: &Operation, remote: &Operation) -> TransformedPair {
    TransformedPair::new(local.to_noop(), remote.clone())
}

fn replaced_id(op: &Operation) -> Option<crate::ids::ElementId> {
    match &op.body {
        OpBody::Replace { replaced, .. } => Some(*replaced),
        _ => None,
    }
}

fn same_array_slot(local: &Operation, remote: &Operation) -> bool {
    local.target == remote.target && local.index() == remote.index()
}

fn delete_wins(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    if remote.affects(local.target) {
        keep_local(local, remote)
    } else {
        TransformedPair::unchanged(local, remote)
    }
}

fn delete_delete(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    if local.target == remote.target {
        discard_both(local, remote)
    } else if local.is_descendant_of(remote.target) {
        keep_remote(local, remote)
    } else if remote.is_descendant_of(local.target) {
        keep_local(local, remote)
    } else {
        TransformedPair::unchanged(local, remote)
    }
}

fn replace_other(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    match replaced_id(local) {
        Some(replaced) if remote.affects(replaced) => keep_local(local, remote),
        _ => TransformedPair::unchanged(local, remote),
    }
}

fn replace_delete(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    if local.affects(remote.target) {
        return keep_remote(local, remote);
    }
    match replaced_id(local) {
        Some(replaced) if remote.affects(replaced) => keep_local(local, remote),
        _ => TransformedPair::unchanged(local, remote),
    }
}

fn replace_replace(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    if local.target == remote.target {
        return discard_both(local, remote);
    }
    if let Some(replaced) = replaced_id(remote) {
        if local.affects(replaced) {
            return keep_remote(local, remote);
        }
    }
    if let Some(replaced) = replaced_id(local) {
        if remote.affects(replaced) {
            return keep_local(local, remote);
        }
    }
    if local.same_slot(remote) {
        return if ranks.remote_wins() {
            TransformedPair::new(local.to_noop(), remote.clone().into_replace(local.target))
        } else {
            TransformedPair::new(local.clone().into_replace(remote.target), remote.to_noop())
        };
    }
    TransformedPair::unchanged(local, remote)
}

fn create_replace(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    if let Some(replaced) = replaced_id(remote) {
        if local.affects(replaced) {
            return keep_remote(local, remote);
        }
    }
    if local.same_slot(remote) {
        return if ranks.remote_wins() {
            TransformedPair::new(local.to_noop(), remote.clone().into_replace(local.target))
        } else {
            TransformedPair::new(local.clone().into_replace(remote.target), remote.to_noop())
        };
    }
    TransformedPair::unchanged(local, remote)
}

fn create_create(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    if local.target == remote.target {
        return discard_both(local, remote);
    }
    if local.same_slot(remote) {
        return if ranks.remote_wins() {
            TransformedPair::new(local.to_noop(), remote.clone().into_replace(local.target))
        } else {
            TransformedPair::new(local.clone().into_replace(remote.target), remote.to_noop())
        };
    }
    TransformedPair::unchanged(local, remote)
}

fn modify_modify(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    if local.target != remote.target {
        return TransformedPair::unchanged(local, remote);
    }
    if local.value() == remote.value() {
        discard_both(local, remote)
    } else if ranks.remote_wins() {
        keep_remote(local, remote)
    } else {
        keep_local(local, remote)
    }
}

fn update_update(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    if !same_array_slot(local, remote) {
        return TransformedPair::unchanged(local, remote);
    }
    if local.value() == remote.value() {
        discard_both(local, remote)
    } else if ranks.remote_wins() {
        keep_remote(local, remote)
    } else {
        keep_local(local, remote)
    }
}

fn update_insert(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    match (local.index(), remote.index()) {
        (Some(u), Some(i)) if local.target == remote.target && u >= i => {
            TransformedPair::new(local.with_index(u.saturating_add(1)), remote.clone())
        }
        _ => TransformedPair::unchanged(local, remote),
    }
}

fn update_remove(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    match (local.index(), remote.index()) {
        (Some(u), Some(r)) if local.target == remote.target && u > r => {
            TransformedPair::new(local.with_index(u - 1), remote.clone())
        }
        (Some(u), Some(r)) if local.target == remote.target && u == r => {
            keep_remote(local, remote)
        }
        _ => TransformedPair::unchanged(local, remote),
    }
}

fn insert_insert(local: &Operation, remote: &Operation, ranks: Ranks) -> TransformedPair {
    let (Some(l), Some(r)) = (local.index(), remote.index()) else {
        return TransformedPair::unchanged(local, remote);
    };
    if local.target != remote.target {
        return TransformedPair::unchanged(local, remote);
    }
    let remote_first = l > r || (l == r && ranks.remote_wins());
    if remote_first {
        TransformedPair::new(local.with_index(l.saturating_add(1)), remote.clone())
    } else {
        TransformedPair::new(local.clone(), remote.with_index(r.saturating_add(1)))
    }
}

fn insert_remove(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    let (Some(i), Some(r)) = (local.index(), remote.index()) else {
        return TransformedPair::unchanged(local, remote);
    };
    if local.target != remote.target {
        return TransformedPair::unchanged(local, remote);
    }
    if i > r {
        TransformedPair::new(local.with_index(i - 1), remote.clone())
    } else {
        TransformedPair::new(local.clone(), remote.with_index(r.saturating_add(1)))
    }
}

fn remove_remove(local: &Operation, remote: &Operation, _: Ranks) -> TransformedPair {
    let (Some(l), Some(r)) = (local.index(), remote.index()) else {
        return TransformedPair::unchanged(local, remote);
    };
    if local.target != remote.target {
        return TransformedPair::unchanged(local, remote);
    }
    if l > r {
        TransformedPair::new(local.with_index(l - 1), remote.clone())
    } else if l < r {
        TransformedPair::new(local.clone(), remote.with_index(r - 1))
    } else {
        discard_both(local, remote)
    }
}
