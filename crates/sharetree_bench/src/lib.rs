//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use sharetree_codec::TypedValue;
use sharetree_core::{ContextConfig, SyncContext};
use sharetree_protocol::{AuthorityLevel, ElementId, ElementKind, ElementSeed, Operation, SystemId, UserId};

/// A context with a fixed system id.
pub fn context(system: u32, authority: AuthorityLevel) -> SyncContext {
    let system = SystemId::new(system.max(1)).unwrap_or_else(SystemId::random);
    SyncContext::new(
        ContextConfig::new()
            .with_system_id(system)
            .with_authority(authority)
            .with_local_user(UserId(system.as_u32())),
    )
}

/// Random lowercase string of `len` characters.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect()
}

/// Creates `count` Int32 children under the root and returns their ids.
pub fn populate(ctx: &mut SyncContext, count: usize) -> Vec<ElementId> {
    let root = ctx.root_id();
    (0..count)
        .filter_map(|i| {
            ctx.create_child(root, ElementKind::Int32, &format!("n{i}"), None, Some(TypedValue::Int32(i as i32)))
                .ok()
        })
        .collect()
}

/// Create operations for `count` children of the root, as a remote peer
/// with system id `system` would generate them.
pub fn remote_creates(system: u32, count: u32) -> Vec<Operation> {
    (0..count)
        .map(|i| {
            let id = ElementId::from_raw((u64::from(system) << 32) | u64::from(i + 1));
            let seed = ElementSeed::new(ElementKind::String, format!("r{i}"), None, Some(random_string(8).into()));
            Operation::create(id, AuthorityLevel::Low, Vec::new(), seed)
        })
        .collect()
}

/// A mixed batch of operations for codec benchmarks.
pub fn mixed_ops(count: u32) -> Vec<Operation> {
    let parent = ElementId::from_raw((7 << 32) | 1);
    (0..count)
        .map(|i| {
            let target = ElementId::from_raw((7 << 32) | u64::from(i + 2));
            match i % 4 {
                0 => Operation::create(
                    target,
                    AuthorityLevel::Low,
                    vec![parent],
                    ElementSeed::new(ElementKind::Float64, format!("f{i}"), None, Some(TypedValue::Float64(f64::from(i)))),
                ),
                1 => Operation::modify(target, AuthorityLevel::Low, vec![parent], TypedValue::Int64(i64::from(i))),
                2 => Operation::insert(target, AuthorityLevel::Low, vec![parent], i, random_string(12).into()),
                _ => Operation::delete(target, AuthorityLevel::Low, vec![parent]),
            }
        })
        .collect()
}
