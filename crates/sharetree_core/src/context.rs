//! The per-peer sync context.
//!
//! A `SyncContext` owns one peer's tree and is the boundary between local
//! mutation and the network. Local mutators apply immediately and queue an
//! operation for [`drain_outbound`](SyncContext::drain_outbound); operations
//! arriving from peers go through
//! [`receive_remote`](SyncContext::receive_remote), which transforms them
//! against queued local work, applies them without re-queueing, and
//! notifies listeners.
//!
//! # Example
//!
//! ```rust
//! use sharetree_core::{ContextConfig, SyncContext};
//! use sharetree_protocol::{AuthorityLevel, ElementKind, SystemId};
//!
//! let mut alice = SyncContext::new(
//!     ContextConfig::new().with_system_id(SystemId::new(1).unwrap()),
//! );
//! let mut bob = SyncContext::new(
//!     ContextConfig::new()
//!         .with_system_id(SystemId::new(2).unwrap())
//!         .with_authority(AuthorityLevel::High),
//! );
//!
//! let root = alice.root_id();
//! let score = alice
//!     .create_child(root, ElementKind::Int32, "score", None, Some(10.into()))
//!     .unwrap();
//!
//! for op in alice.drain_outbound() {
//!     bob.receive_remote(op, alice.rank());
//! }
//! assert_eq!(bob.lookup(score).unwrap().value(), Some(&10.into()));
//! ```

use crate::config::ContextConfig;
use crate::element::{Element, ElementBody};
use crate::engine::{ApplyEngine, ApplyOutcome, Effect, Tombstones};
use crate::error::{CoreError, CoreResult};
use crate::factory::ElementFactory;
use crate::listener::{ChannelListener, ElementEvent, ElementListener, ListenerId, ListenerRegistry};
use crate::pending::PendingBuffer;
use crate::stats::ContextStats;
use crate::tree::ElementTree;
use sharetree_codec::TypedValue;
use sharetree_protocol::{
    AuthorityLevel, ElementId, ElementKind, ElementSeed, IdGenerator, OpBody, Operation,
    OperationFactory, OperationType, PeerRank, Ranks, SystemId, TransformManager, UserId,
};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, trace, warn};

/// Hook called with every consistency error.
pub type ErrorHook = Box<dyn FnMut(&CoreError) + Send>;

/// Identifies a child for [`SyncContext::remove_child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKey<'a> {
    /// By element id.
    Id(ElementId),
    /// By name.
    Name(&'a str),
}

/// Selects owned elements for [`SyncContext::remove_owned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Elements owned by this user.
    Only(UserId),
    /// Elements owned by anyone but this user. Unowned elements never match.
    AllExcept(UserId),
}

impl OwnerFilter {
    /// Whether an element with `owner` is selected.
    pub fn matches(self, owner: Option<UserId>) -> bool {
        match (self, owner) {
            (_, None) => false,
            (Self::Only(user), Some(owner)) => owner == user,
            (Self::AllExcept(user), Some(owner)) => owner != user,
        }
    }
}

/// A remote operation that changed the tree, with the rank of the peer it
/// came from. Callers relaying between peers forward these.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedRemote {
    /// The operation as applied.
    pub op: Operation,
    /// Rank of the sending peer.
    pub from: PeerRank,
}

/// One peer's replicated tree and its local/remote boundary.
pub struct SyncContext {
    config: ContextConfig,
    rank: PeerRank,
    ids: IdGenerator,
    tree: ElementTree,
    tombstones: Tombstones,
    element_factory: ElementFactory,
    op_factory: OperationFactory,
    transforms: TransformManager,
    outbound: VecDeque<Operation>,
    pending: PendingBuffer,
    listeners: ListenerRegistry,
    error_hook: Option<ErrorHook>,
    stats: ContextStats,
}

impl SyncContext {
    /// Creates a context holding an empty root.
    pub fn new(config: ContextConfig) -> Self {
        let system_id = config.system_id.unwrap_or_else(SystemId::random);
        let rank = PeerRank::new(config.authority, system_id);
        let pending = PendingBuffer::new(config.pending_capacity, config.pending_retry_budget);
        debug!(system = %system_id, authority = %config.authority, "sync context created");
        Self {
            config,
            rank,
            ids: IdGenerator::new(system_id),
            tree: ElementTree::new(),
            tombstones: Tombstones::default(),
            element_factory: ElementFactory::new(),
            op_factory: OperationFactory::new(),
            transforms: TransformManager::new(),
            outbound: VecDeque::new(),
            pending,
            listeners: ListenerRegistry::default(),
            error_hook: None,
            stats: ContextStats::new(),
        }
    }

    /// Authority stamped on local operations.
    pub fn authority(&self) -> AuthorityLevel {
        self.config.authority
    }

    /// This peer's system id.
    pub fn system_id(&self) -> SystemId {
        self.rank.system_id
    }

    /// This peer's tie-break rank.
    pub fn rank(&self) -> PeerRank {
        self.rank
    }

    /// The user on this peer.
    pub fn local_user(&self) -> UserId {
        self.config.local_user
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The tree.
    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    /// The root id.
    pub fn root_id(&self) -> ElementId {
        self.tree.root_id()
    }

    /// Looks up a live element. Unknown and deleted ids both return `None`.
    pub fn lookup(&self, id: ElementId) -> Option<&Element> {
        self.tree.get(id)
    }

    /// Statistics.
    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Element constructors, for registering custom kinds.
    pub fn element_factory_mut(&mut self) -> &mut ElementFactory {
        &mut self.element_factory
    }

    /// Operation decoders used for incoming bytes.
    pub fn operation_factory(&self) -> &OperationFactory {
        &self.op_factory
    }

    /// Mutable access to the operation decoders.
    pub fn operation_factory_mut(&mut self) -> &mut OperationFactory {
        &mut self.op_factory
    }

    /// Pairwise transforms.
    pub fn transforms(&self) -> &TransformManager {
        &self.transforms
    }

    /// Mutable access to the pairwise transforms.
    pub fn transforms_mut(&mut self) -> &mut TransformManager {
        &mut self.transforms
    }

    // =========================================================================
    // Local mutation
    // =========================================================================

    /// Creates a child of the object `parent`.
    ///
    /// `starting_value` is the scalar value for leaves and the object type
    /// (a String) for objects; arrays start empty and take none.
    ///
    /// # Errors
    ///
    /// `NotFound` if `parent` is absent, `KindMismatch` if it is not an
    /// object or the value does not fit `kind`, `DuplicateName` if the name
    /// is taken, `UnknownKind` if `kind` has no constructor.
    pub fn create_child(
        &mut self,
        parent: ElementId,
        kind: ElementKind,
        name: &str,
        owner: Option<UserId>,
        starting_value: Option<TypedValue>,
    ) -> CoreResult<ElementId> {
        let ancestors = self
            .tree
            .path_for_child(parent)
            .ok_or(CoreError::not_found(parent))?;
        let id = self
            .ids
            .next_id()
            .ok_or_else(|| CoreError::invalid_operation("element id space exhausted"))?;
        let seed = ElementSeed::new(kind, name, owner, starting_value);
        self.apply_local_op(Operation::create(id, self.authority(), ancestors, seed))?;
        Ok(id)
    }

    /// Creates a child object with the given type.
    pub fn create_object(
        &mut self,
        parent: ElementId,
        name: &str,
        object_type: &str,
        owner: Option<UserId>,
    ) -> CoreResult<ElementId> {
        self.create_child(
            parent,
            ElementKind::Object,
            name,
            owner,
            Some(TypedValue::from(object_type)),
        )
    }

    /// Removes a child of `parent` and everything below it.
    ///
    /// # Errors
    ///
    /// `NotFound` if `parent` or the child is absent.
    pub fn remove_child(&mut self, parent: ElementId, key: ChildKey<'_>) -> CoreResult<()> {
        if !self.tree.contains(parent) {
            return Err(CoreError::not_found(parent));
        }
        let child = match key {
            ChildKey::Id(id) => self
                .tree
                .get(id)
                .filter(|c| c.parent() == Some(parent))
                .map(Element::id)
                .ok_or(CoreError::not_found(id))?,
            ChildKey::Name(name) => self
                .tree
                .child_named(parent, name)
                .map(Element::id)
                .ok_or_else(|| CoreError::child_not_found(parent, name))?,
        };
        let ancestors = self.ancestors(child)?;
        self.apply_local_op(Operation::delete(child, self.authority(), ancestors))?;
        Ok(())
    }

    /// Sets a scalar value, or an object's type when given a String.
    ///
    /// Returns `false` without queueing anything if the value is unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `KindMismatch` on arrays and wrong value kinds.
    pub fn set_value(&mut self, id: ElementId, value: impl Into<TypedValue>) -> CoreResult<bool> {
        let ancestors = self.ancestors(id)?;
        let op = Operation::modify(id, self.authority(), ancestors, value.into());
        Ok(self.apply_local_op(op)?.is_some())
    }

    /// Inserts `value` at `index` (`0..=len`) in an array.
    ///
    /// # Errors
    ///
    /// `NotFound`, `KindMismatch` or `IndexOutOfRange`.
    pub fn array_insert(&mut self, id: ElementId, index: usize, value: impl Into<TypedValue>) -> CoreResult<()> {
        let (ancestors, index) = self.array_target(id, index)?;
        self.apply_local_op(Operation::insert(id, self.authority(), ancestors, index, value.into()))?;
        Ok(())
    }

    /// Removes and returns the item at `index` (`0..len`).
    ///
    /// # Errors
    ///
    /// `NotFound`, `KindMismatch` or `IndexOutOfRange`.
    pub fn array_remove(&mut self, id: ElementId, index: usize) -> CoreResult<TypedValue> {
        let (ancestors, wire_index) = self.array_target(id, index)?;
        let effects = self.apply_local_op(Operation::remove(id, self.authority(), ancestors, wire_index))?;
        effects
            .into_iter()
            .flatten()
            .find_map(|effect| match effect {
                Effect::ArrayRemoved { value, .. } => Some(value),
                _ => None,
            })
            .ok_or(CoreError::IndexOutOfRange { index, len: 0 })
    }

    /// Overwrites the item at `index` (`0..len`).
    ///
    /// # Errors
    ///
    /// `NotFound`, `KindMismatch` or `IndexOutOfRange`.
    pub fn array_set(&mut self, id: ElementId, index: usize, value: impl Into<TypedValue>) -> CoreResult<()> {
        let (ancestors, index) = self.array_target(id, index)?;
        self.apply_local_op(Operation::update(id, self.authority(), ancestors, index, value.into()))?;
        Ok(())
    }

    /// Applies a locally generated operation and queues it for peers.
    ///
    /// # Errors
    ///
    /// Propagates the tree mutation's error; the tree is left unchanged.
    pub fn apply_local(&mut self, op: Operation) -> CoreResult<()> {
        self.apply_local_op(op).map(|_| ())
    }

    /// Takes every queued local operation.
    pub fn drain_outbound(&mut self) -> Vec<Operation> {
        self.outbound.drain(..).filter(|op| !op.is_noop()).collect()
    }

    /// Number of queued local operations.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    fn ancestors(&self, id: ElementId) -> CoreResult<Vec<ElementId>> {
        self.tree.ancestors_of(id).ok_or(CoreError::not_found(id))
    }

    fn array_target(&self, id: ElementId, index: usize) -> CoreResult<(Vec<ElementId>, u32)> {
        let ancestors = self.ancestors(id)?;
        let len = self.tree.get(id).and_then(Element::items).map_or(0, <[TypedValue]>::len);
        let index = u32::try_from(index).map_err(|_| CoreError::IndexOutOfRange { index, len })?;
        Ok((ancestors, index))
    }

    /// Applies `op` and queues it if the tree changed. Returns the effects,
    /// or `None` when there was nothing to do.
    fn apply_local_op(&mut self, op: Operation) -> CoreResult<Option<Vec<Effect>>> {
        let outcome = ApplyEngine {
            tree: &mut self.tree,
            tombstones: &mut self.tombstones,
            factory: &self.element_factory,
        }
        .apply(&op)?;
        match outcome {
            ApplyOutcome::Applied(effects) => {
                trace!(op = %op, "applied local operation");
                self.forget_removed(&effects);
                self.stats.record_local_op();
                self.outbound.push_back(op);
                Ok(Some(effects))
            }
            ApplyOutcome::Skipped => Ok(None),
            ApplyOutcome::Discarded => Err(CoreError::not_found(op.target)),
            ApplyOutcome::Missing(id) => Err(CoreError::not_found(id)),
        }
    }

    /// Undoes local work that has not been sent yet: drops every operation
    /// queued after the first `queued` and detaches `created`.
    pub(crate) fn roll_back_local(&mut self, queued: usize, created: &[ElementId]) {
        self.outbound.truncate(queued);
        for id in created.iter().rev() {
            if let Some(removed) = self.tree.detach(*id) {
                for element in &removed {
                    self.listeners.drop_element(element.id());
                }
            }
        }
    }

    // =========================================================================
    // Remote operations
    // =========================================================================

    /// Applies an operation received from the peer ranked `from`.
    ///
    /// The operation is transformed against every queued local operation
    /// (which are rewritten in turn), then applied without being queued.
    /// Operations needing an element that has not arrived are parked until
    /// its Create is applied. Failures are reported through the error hook
    /// and never returned.
    ///
    /// Returns every operation that changed the tree: the incoming one and
    /// any parked operations it released.
    pub fn receive_remote(&mut self, op: Operation, from: PeerRank) -> Vec<AppliedRemote> {
        let original_type = op.op_type();
        let target = op.target;
        let op = self
            .transforms
            .transform_against(self.outbound.iter_mut(), op, Ranks::new(self.rank, from));

        if op.is_noop()
            && matches!(original_type, OperationType::Create | OperationType::Replace)
            && !self.tree.contains(target)
        {
            debug!(target = %target, "remote create lost a conflict");
            self.bury(target);
        }

        let mut applied = Vec::new();
        let mut work = VecDeque::from([(op, from)]);
        while let Some((op, from)) = work.pop_front() {
            self.apply_remote(op, from, &mut work, &mut applied);
        }
        applied
    }

    fn apply_remote(
        &mut self,
        op: Operation,
        from: PeerRank,
        work: &mut VecDeque<(Operation, PeerRank)>,
        applied: &mut Vec<AppliedRemote>,
    ) {
        let outcome = ApplyEngine {
            tree: &mut self.tree,
            tombstones: &mut self.tombstones,
            factory: &self.element_factory,
        }
        .apply(&op);

        match outcome {
            Ok(ApplyOutcome::Applied(effects)) => {
                self.stats.record_applied();
                trace!(op = %op, from = %from, "applied remote operation");
                notify(&mut self.listeners, &self.tree, &effects);
                self.forget_removed(&effects);
                if let OpBody::Replace { replaced, .. } = &op.body {
                    self.bury(*replaced);
                }
                if op.seed().is_some() {
                    let released = self.pending.take(op.target);
                    for parked in released.into_iter().rev() {
                        self.stats.record_released();
                        debug!(op = %parked.op, "released parked operation");
                        work.push_front((parked.op, parked.from));
                    }
                }
                applied.push(AppliedRemote { op, from });
            }
            Ok(ApplyOutcome::Skipped) => {
                self.stats.record_skipped();
                trace!(op = %op, "remote operation already reflected");
            }
            Ok(ApplyOutcome::Discarded) => {
                self.stats.record_discarded();
                debug!(op = %op, "discarded remote operation on deleted element");
            }
            Ok(ApplyOutcome::Missing(missing)) => match self.pending.park(missing, op, from) {
                Ok(()) => {
                    self.stats.record_parked();
                    debug!(missing = %missing, "parked remote operation");
                }
                Err((op, _)) => {
                    let reason = format!("pending buffer full while waiting for {missing}");
                    self.report(CoreError::consistency(&op, reason));
                }
            },
            Err(err) => self.report(CoreError::consistency(&op, err.to_string())),
        }
    }

    /// Spends one retry tick of every parked operation and reports the ones
    /// whose budget ran out. Returns how many expired.
    pub fn retry_pending(&mut self) -> usize {
        let expired = self.pending.tick();
        let count = expired.len();
        for parked in expired {
            let reason = format!(
                "element missing after {} retries",
                self.config.pending_retry_budget
            );
            self.report(CoreError::consistency(&parked.op, reason));
        }
        count
    }

    /// Number of parked remote operations.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Tombstones `id` and drops whatever was parked waiting for it.
    fn bury(&mut self, id: ElementId) {
        self.tombstones.insert(id);
        for _ in self.pending.take(id) {
            self.stats.record_discarded();
        }
    }

    fn forget_removed(&mut self, effects: &[Effect]) {
        for effect in effects {
            if let Effect::ChildRemoved { removed, .. } = effect {
                for element in removed {
                    self.listeners.drop_element(element.id());
                    for _ in self.pending.take(element.id()) {
                        self.stats.record_discarded();
                    }
                }
            }
        }
    }

    fn report(&mut self, err: CoreError) {
        self.stats.record_consistency_error();
        warn!(error = %err, "unresolved remote operation");
        if let Some(hook) = self.error_hook.as_mut() {
            hook(&err);
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Deletes every top-most element whose owner matches `filter`,
    /// notifies listeners and queues the deletes for peers. Returns how
    /// many subtrees were removed.
    pub fn remove_owned(&mut self, filter: OwnerFilter) -> usize {
        let roots = self.tree.owned_roots(|owner| filter.matches(owner));
        let mut removed = 0;
        for id in roots {
            let Some(ancestors) = self.tree.ancestors_of(id) else {
                continue;
            };
            let op = Operation::delete(id, self.authority(), ancestors);
            let outcome = ApplyEngine {
                tree: &mut self.tree,
                tombstones: &mut self.tombstones,
                factory: &self.element_factory,
            }
            .apply(&op);
            if let Ok(ApplyOutcome::Applied(effects)) = outcome {
                debug!(element = %id, "removed owned element");
                notify(&mut self.listeners, &self.tree, &effects);
                self.forget_removed(&effects);
                self.stats.record_local_op();
                self.outbound.push_back(op);
                removed += 1;
            }
        }
        removed
    }

    /// Operations that rebuild the current tree on an empty peer: a Create
    /// per element, parents first, each array followed by Inserts for its
    /// items.
    pub fn starting_state(&self) -> Vec<Operation> {
        let authority = self.authority();
        let mut ops = Vec::new();
        for id in self.tree.descendants(ElementId::ROOT) {
            let (Some(element), Some(ancestors)) = (self.tree.get(id), self.tree.ancestors_of(id))
            else {
                continue;
            };
            let value = match element.body() {
                ElementBody::Scalar(value) => Some(value.clone()),
                ElementBody::Object { object_type, .. } => Some(TypedValue::from(object_type.as_str())),
                ElementBody::Array(_) => None,
            };
            let seed = ElementSeed::new(element.kind(), element.name(), element.owner(), value);
            ops.push(Operation::create(id, authority, ancestors.clone(), seed));
            for (index, item) in (0u32..).zip(element.items().unwrap_or_default()) {
                ops.push(Operation::insert(id, authority, ancestors.clone(), index, item.clone()));
            }
        }
        ops
    }

    /// Logs the tree at info level, one element per line.
    pub fn log_tree(&self) {
        info!(system = %self.system_id(), elements = self.tree.len(), "sync data tree");
        for line in self.tree.render().lines() {
            info!("{line}");
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener on `element`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the element is absent.
    pub fn add_listener(&mut self, element: ElementId, listener: Box<dyn ElementListener>) -> CoreResult<ListenerId> {
        if !self.tree.contains(element) {
            return Err(CoreError::not_found(element));
        }
        Ok(self.listeners.add(element, listener))
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Number of listeners on `element`.
    pub fn listener_count(&self, element: ElementId) -> usize {
        self.listeners.count(element)
    }

    /// Subscribes to `element` through a channel.
    ///
    /// # Errors
    ///
    /// `NotFound` if the element is absent.
    pub fn subscribe(&mut self, element: ElementId) -> CoreResult<Receiver<ElementEvent>> {
        let (listener, rx) = ChannelListener::new();
        self.add_listener(element, Box::new(listener))?;
        Ok(rx)
    }

    /// Installs the hook that receives consistency errors.
    pub fn set_error_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&CoreError) + Send + 'static,
    {
        self.error_hook = Some(Box::new(hook));
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("rank", &self.rank)
            .field("elements", &self.tree.len())
            .field("outbound", &self.outbound.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

fn notify(listeners: &mut ListenerRegistry, tree: &ElementTree, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::ValueChanged { id, value } => {
                listeners.notify(*id, |l| l.on_value_changed(tree, *id, value));
            }
            Effect::ChildAdded { parent, child } => {
                if let Some(child) = tree.get(*child) {
                    listeners.notify(*parent, |l| l.on_child_added(tree, *parent, child));
                }
            }
            Effect::ChildRemoved { parent, removed } => {
                let Some(first) = removed.first() else { continue };
                listeners.notify(*parent, |l| l.on_child_removed(tree, *parent, first.id(), first));
                listeners.notify(first.id(), |l| l.on_child_removed(tree, *parent, first.id(), first));
            }
            Effect::ArrayInserted { id, index, value } => {
                listeners.notify(*id, |l| l.on_array_inserted(tree, *id, *index, value));
            }
            Effect::ArrayUpdated { id, index, value } => {
                listeners.notify(*id, |l| l.on_array_updated(tree, *id, *index, value));
            }
            Effect::ArrayRemoved { id, index, value } => {
                listeners.notify(*id, |l| l.on_array_removed(tree, *id, *index, value));
            }
        }
    }
}
