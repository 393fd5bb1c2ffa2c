//! Applies operations to a tree.
//!
//! Every operation is validated completely before the tree is touched, so
//! a failed apply leaves the tree unchanged.

use crate::element::{Element, ElementBody};
use crate::error::{CoreError, CoreResult};
use crate::factory::ElementFactory;
use crate::tree::ElementTree;
use sharetree_codec::{TypedValue, ValueKind};
use sharetree_protocol::{ElementId, ElementKind, ElementSeed, OpBody, Operation};
use std::collections::HashSet;

/// One observable change made by an apply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    ValueChanged {
        id: ElementId,
        value: TypedValue,
    },
    ChildAdded {
        parent: ElementId,
        child: ElementId,
    },
    /// `removed` holds the child first, then its descendants.
    ChildRemoved {
        parent: ElementId,
        removed: Vec<Element>,
    },
    ArrayInserted {
        id: ElementId,
        index: usize,
        value: TypedValue,
    },
    ArrayUpdated {
        id: ElementId,
        index: usize,
        value: TypedValue,
    },
    ArrayRemoved {
        id: ElementId,
        index: usize,
        value: TypedValue,
    },
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApplyOutcome {
    /// The tree changed.
    Applied(Vec<Effect>),
    /// Nothing to do: Ack, Noop, an unchanged value, a repeated Create or a
    /// Delete of an absent element.
    Skipped,
    /// The operation targets a deleted or replaced element.
    Discarded,
    /// The operation needs an element that has not arrived.
    Missing(ElementId),
}

/// Deleted and replaced ids. Operations under any of them are discarded.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tombstones {
    ids: HashSet<ElementId>,
}

impl Tombstones {
    pub(crate) fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn insert(&mut self, id: ElementId) {
        self.ids.insert(id);
    }

    pub(crate) fn covers(&self, op: &Operation) -> bool {
        self.contains(op.target) || op.ancestors.iter().any(|a| self.contains(*a))
    }
}

/// Applies operations against one tree.
pub(crate) struct ApplyEngine<'a> {
    pub(crate) tree: &'a mut ElementTree,
    pub(crate) tombstones: &'a mut Tombstones,
    pub(crate) factory: &'a ElementFactory,
}

impl ApplyEngine<'_> {
    pub(crate) fn apply(&mut self, op: &Operation) -> CoreResult<ApplyOutcome> {
        if matches!(op.body, OpBody::Ack | OpBody::Noop) {
            return Ok(ApplyOutcome::Skipped);
        }
        if self.tombstones.covers(op) {
            return Ok(ApplyOutcome::Discarded);
        }
        match &op.body {
            OpBody::Ack | OpBody::Noop => Ok(ApplyOutcome::Skipped),
            OpBody::Create(seed) => self.create(op, seed),
            OpBody::Replace { replaced, seed } => self.replace(op, *replaced, seed),
            OpBody::Modify { value } => self.modify(op.target, value),
            OpBody::Delete => self.delete(op.target),
            OpBody::Insert { index, value } => self.insert(op.target, *index as usize, value),
            OpBody::Update { index, value } => self.update(op.target, *index as usize, value),
            OpBody::Remove { index } => self.remove(op.target, *index as usize),
        }
    }

    fn build(&self, op: &Operation, seed: &ElementSeed) -> CoreResult<Element> {
        let (kind, body) = self.factory.create(seed.kind.to_code(), seed.value.clone())?;
        Ok(Element::new(
            op.target,
            seed.name.clone(),
            Some(op.parent()),
            seed.owner,
            kind,
            body,
        ))
    }

    fn check_parent(&self, parent: ElementId) -> CoreResult<Option<ApplyOutcome>> {
        match self.tree.get(parent) {
            None => Ok(Some(ApplyOutcome::Missing(parent))),
            Some(p) if !p.is_object() => Err(CoreError::kind_mismatch(ElementKind::Object, p.kind)),
            Some(_) => Ok(None),
        }
    }

    fn create(&mut self, op: &Operation, seed: &ElementSeed) -> CoreResult<ApplyOutcome> {
        if op.target.is_root() {
            return Err(CoreError::invalid_operation("cannot create the root"));
        }
        if self.tree.contains(op.target) {
            return Ok(ApplyOutcome::Skipped);
        }
        let parent = op.parent();
        if let Some(outcome) = self.check_parent(parent)? {
            return Ok(outcome);
        }
        let element = self.build(op, seed)?;
        self.tree.attach(element)?;
        Ok(ApplyOutcome::Applied(vec![Effect::ChildAdded {
            parent,
            child: op.target,
        }]))
    }

    fn replace(&mut self, op: &Operation, replaced: ElementId, seed: &ElementSeed) -> CoreResult<ApplyOutcome> {
        if op.target.is_root() || replaced.is_root() {
            return Err(CoreError::invalid_operation("cannot replace the root"));
        }
        if self.tree.contains(op.target) {
            return Ok(ApplyOutcome::Skipped);
        }
        let parent = op.parent();
        if let Some(outcome) = self.check_parent(parent)? {
            return Ok(outcome);
        }
        let element = self.build(op, seed)?;
        if let Some(existing) = self.tree.child_named(parent, &seed.name) {
            if existing.id != replaced {
                return Err(CoreError::DuplicateName {
                    parent,
                    name: seed.name.clone(),
                });
            }
        }

        let mut effects = Vec::new();
        self.tombstones.insert(replaced);
        if let Some(removed) = self.detach(replaced) {
            effects.push(removed);
        }
        self.tree.attach(element)?;
        effects.push(Effect::ChildAdded {
            parent,
            child: op.target,
        });
        Ok(ApplyOutcome::Applied(effects))
    }

    fn delete(&mut self, target: ElementId) -> CoreResult<ApplyOutcome> {
        if target.is_root() {
            return Err(CoreError::invalid_operation("cannot delete the root"));
        }
        self.tombstones.insert(target);
        Ok(match self.detach(target) {
            Some(effect) => ApplyOutcome::Applied(vec![effect]),
            None => ApplyOutcome::Skipped,
        })
    }

    fn detach(&mut self, id: ElementId) -> Option<Effect> {
        let parent = self.tree.get(id)?.parent?;
        let removed = self.tree.detach(id)?;
        for element in &removed {
            self.tombstones.insert(element.id);
        }
        Some(Effect::ChildRemoved { parent, removed })
    }

    fn modify(&mut self, target: ElementId, value: &TypedValue) -> CoreResult<ApplyOutcome> {
        let Some(element) = self.tree.get_mut(target) else {
            return Ok(ApplyOutcome::Missing(target));
        };
        let kind = element.kind;
        match &mut element.body {
            ElementBody::Scalar(current) => {
                let expected = kind.scalar_value_kind().unwrap_or(current.kind());
                if value.kind() != expected {
                    return Err(CoreError::kind_mismatch(expected, value.kind()));
                }
                if current == value {
                    return Ok(ApplyOutcome::Skipped);
                }
                *current = value.clone();
            }
            ElementBody::Object { object_type, .. } => {
                let Some(new_type) = value.as_str() else {
                    return Err(CoreError::kind_mismatch(ValueKind::String, value.kind()));
                };
                if object_type == new_type {
                    return Ok(ApplyOutcome::Skipped);
                }
                *object_type = new_type.to_string();
            }
            ElementBody::Array(_) => return Err(CoreError::kind_mismatch("scalar or object", kind)),
        }
        Ok(ApplyOutcome::Applied(vec![Effect::ValueChanged {
            id: target,
            value: value.clone(),
        }]))
    }

    /// Resolves an array element, checking the item kind of `value`.
    fn array_mut(
        &mut self,
        target: ElementId,
        value: Option<&TypedValue>,
    ) -> CoreResult<Result<&mut Vec<TypedValue>, ApplyOutcome>> {
        let Some(element) = self.tree.get_mut(target) else {
            return Ok(Err(ApplyOutcome::Missing(target)));
        };
        let kind = element.kind;
        let ElementBody::Array(items) = &mut element.body else {
            return Err(CoreError::kind_mismatch("array", kind));
        };
        if let (Some(expected), Some(value)) = (kind.array_item_kind(), value) {
            if value.kind() != expected {
                return Err(CoreError::kind_mismatch(expected, value.kind()));
            }
        }
        Ok(Ok(items))
    }

    fn insert(&mut self, target: ElementId, index: usize, value: &TypedValue) -> CoreResult<ApplyOutcome> {
        let items = match self.array_mut(target, Some(value))? {
            Ok(items) => items,
            Err(outcome) => return Ok(outcome),
        };
        if index > items.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        items.insert(index, value.clone());
        Ok(ApplyOutcome::Applied(vec![Effect::ArrayInserted {
            id: target,
            index,
            value: value.clone(),
        }]))
    }

    fn update(&mut self, target: ElementId, index: usize, value: &TypedValue) -> CoreResult<ApplyOutcome> {
        let items = match self.array_mut(target, Some(value))? {
            Ok(items) => items,
            Err(outcome) => return Ok(outcome),
        };
        let len = items.len();
        let Some(slot) = items.get_mut(index) else {
            return Err(CoreError::IndexOutOfRange { index, len });
        };
        if slot == value {
            return Ok(ApplyOutcome::Skipped);
        }
        *slot = value.clone();
        Ok(ApplyOutcome::Applied(vec![Effect::ArrayUpdated {
            id: target,
            index,
            value: value.clone(),
        }]))
    }

    fn remove(&mut self, target: ElementId, index: usize) -> CoreResult<ApplyOutcome> {
        // A missing array has already lost whatever this would remove.
        let items = match self.array_mut(target, None)? {
            Ok(items) => items,
            Err(ApplyOutcome::Missing(_)) => return Ok(ApplyOutcome::Skipped),
            Err(outcome) => return Ok(outcome),
        };
        if index >= items.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        let value = items.remove(index);
        Ok(ApplyOutcome::Applied(vec![Effect::ArrayRemoved {
            id: target,
            index,
            value,
        }]))
    }
}
