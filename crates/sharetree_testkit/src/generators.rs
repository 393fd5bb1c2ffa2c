//! Property-based test generators using proptest.
//!
//! Provides strategies for values, identifiers and operations, plus
//! [`Edit`], a random local mutation against the sample tree used to drive
//! convergence tests.

use crate::fixtures::SampleTree;
use proptest::prelude::*;
use sharetree_codec::{TypedValue, ValueKind};
use sharetree_core::{ChildKey, SyncContext};
use sharetree_protocol::{AuthorityLevel, ElementId, ElementKind, ElementSeed, Operation, UserId};

/// Strategy for values of every kind.
pub fn typed_value_strategy() -> impl Strategy<Value = TypedValue> {
    prop_oneof![
        any::<bool>().prop_map(TypedValue::Bool),
        any::<i32>().prop_map(TypedValue::Int32),
        any::<i64>().prop_map(TypedValue::Int64),
        any::<f32>().prop_map(TypedValue::Float32),
        any::<f64>().prop_map(TypedValue::Float64),
        ".{0,24}".prop_map(TypedValue::String),
    ]
}

/// Strategy for values of one kind.
pub fn value_of_kind(kind: ValueKind) -> BoxedStrategy<TypedValue> {
    match kind {
        ValueKind::Bool => any::<bool>().prop_map(TypedValue::Bool).boxed(),
        ValueKind::Int32 => any::<i32>().prop_map(TypedValue::Int32).boxed(),
        ValueKind::Int64 => any::<i64>().prop_map(TypedValue::Int64).boxed(),
        ValueKind::Float32 => any::<f32>().prop_map(TypedValue::Float32).boxed(),
        ValueKind::Float64 => any::<f64>().prop_map(TypedValue::Float64).boxed(),
        ValueKind::String => "[a-z]{0,12}".prop_map(TypedValue::String).boxed(),
    }
}

/// Strategy for element names.
pub fn element_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for authority levels.
pub fn authority_strategy() -> impl Strategy<Value = AuthorityLevel> {
    prop_oneof![
        Just(AuthorityLevel::Low),
        Just(AuthorityLevel::Medium),
        Just(AuthorityLevel::High),
    ]
}

/// Strategy for non-root element ids.
pub fn element_id_strategy() -> impl Strategy<Value = ElementId> {
    (1u64..=u64::from(u32::MAX), any::<u32>())
        .prop_map(|(system, counter)| ElementId::from_raw((system << 32) | u64::from(counter)))
}

/// Strategy for element kinds.
pub fn element_kind_strategy() -> impl Strategy<Value = ElementKind> {
    prop_oneof![
        Just(ElementKind::Bool),
        Just(ElementKind::Int32),
        Just(ElementKind::Int64),
        Just(ElementKind::Float32),
        Just(ElementKind::Float64),
        Just(ElementKind::String),
        Just(ElementKind::Object),
        Just(ElementKind::Int32Array),
        Just(ElementKind::Float32Array),
        Just(ElementKind::StringArray),
    ]
}

/// Strategy for element seeds whose starting value fits the kind.
pub fn seed_strategy() -> impl Strategy<Value = ElementSeed> {
    (
        element_kind_strategy(),
        element_name_strategy(),
        prop::option::of(any::<u32>().prop_map(UserId)),
    )
        .prop_flat_map(|(kind, name, owner)| {
            let value = match kind.scalar_value_kind() {
                Some(value_kind) => value_of_kind(value_kind).prop_map(Some).boxed(),
                None if kind.is_object() => "[A-Z][a-z]{0,8}"
                    .prop_map(|t| Some(TypedValue::String(t)))
                    .boxed(),
                None => Just(None).boxed(),
            };
            value.prop_map(move |value| ElementSeed::new(kind, name.clone(), owner, value))
        })
}

/// Strategy for operations of every type.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    let header = (
        element_id_strategy(),
        authority_strategy(),
        prop::collection::vec(element_id_strategy(), 0..4),
    );
    (header, 0u8..9, seed_strategy(), typed_value_strategy(), 0u32..64, element_id_strategy())
        .prop_map(|((target, authority, ancestors), variant, seed, value, index, other)| match variant {
            0 => Operation::ack(authority),
            1 => Operation::noop(authority),
            2 => Operation::create(target, authority, ancestors, seed),
            3 => Operation::modify(target, authority, ancestors, value),
            4 => Operation::update(target, authority, ancestors, index, value),
            5 => Operation::delete(target, authority, ancestors),
            6 => Operation::insert(target, authority, ancestors, index, value),
            7 => Operation::remove(target, authority, ancestors, index),
            _ => Operation::replace(target, authority, ancestors, other, seed),
        })
}

/// Names contended by [`Edit::CreateNamed`] so that peers collide on slots.
pub const CONTENDED_NAMES: [&str; 3] = ["x", "y", "z"];

/// A random local mutation against a [`SampleTree`].
#[derive(Debug, Clone)]
pub enum Edit {
    /// Set the score.
    SetScore(i32),
    /// Set the title.
    SetTitle(String),
    /// Create an Int32 child of the scene under a contended name.
    CreateNamed(usize, i32),
    /// Set the value of a contended child, if present.
    SetNamed(usize, i32),
    /// Remove a contended child, if present.
    RemoveNamed(usize),
    /// Insert a tag at a position scaled to the current length.
    InsertTag(usize, String),
    /// Remove a tag at a position scaled to the current length.
    RemoveTag(usize),
    /// Overwrite a tag at a position scaled to the current length.
    SetTag(usize, String),
}

/// Strategy for edits.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    let name = 0..CONTENDED_NAMES.len();
    prop_oneof![
        any::<i32>().prop_map(Edit::SetScore),
        "[a-z]{1,6}".prop_map(Edit::SetTitle),
        (name.clone(), any::<i32>()).prop_map(|(n, v)| Edit::CreateNamed(n, v)),
        (name.clone(), any::<i32>()).prop_map(|(n, v)| Edit::SetNamed(n, v)),
        name.prop_map(Edit::RemoveNamed),
        (any::<usize>(), "[a-z]{1,3}").prop_map(|(i, s)| Edit::InsertTag(i, s)),
        any::<usize>().prop_map(Edit::RemoveTag),
        (any::<usize>(), "[a-z]{1,3}").prop_map(|(i, s)| Edit::SetTag(i, s)),
    ]
}

/// Applies `edit` to `ctx`. Returns whether anything changed.
///
/// Edits that do not fit the current tree (a missing child, an empty
/// array, a taken name) are skipped.
pub fn apply_edit(ctx: &mut SyncContext, ids: &SampleTree, edit: &Edit) -> bool {
    let tag_count = ctx
        .lookup(ids.tags)
        .and_then(|e| e.items())
        .map_or(0, <[TypedValue]>::len);
    let named = |ctx: &SyncContext, n: usize| {
        ctx.tree()
            .child_named(ids.scene, CONTENDED_NAMES[n])
            .map(|e| e.id())
    };
    match edit {
        Edit::SetScore(v) => ctx.set_value(ids.score, *v).unwrap_or(false),
        Edit::SetTitle(s) => ctx.set_value(ids.title, s.as_str()).unwrap_or(false),
        Edit::CreateNamed(n, v) => ctx
            .create_child(
                ids.scene,
                ElementKind::Int32,
                CONTENDED_NAMES[*n],
                None,
                Some(TypedValue::Int32(*v)),
            )
            .is_ok(),
        Edit::SetNamed(n, v) => match named(ctx, *n) {
            Some(id) => ctx.set_value(id, *v).unwrap_or(false),
            None => false,
        },
        Edit::RemoveNamed(n) => ctx
            .remove_child(ids.scene, ChildKey::Name(CONTENDED_NAMES[*n]))
            .is_ok(),
        Edit::InsertTag(i, s) => ctx
            .array_insert(ids.tags, i % (tag_count + 1), s.as_str())
            .is_ok(),
        Edit::RemoveTag(_) if tag_count == 0 => false,
        Edit::RemoveTag(i) => ctx.array_remove(ids.tags, i % tag_count).is_ok(),
        Edit::SetTag(_, _) if tag_count == 0 => false,
        Edit::SetTag(i, s) => ctx.array_set(ids.tags, i % tag_count, s.as_str()).is_ok(),
    }
}
