//! Context and manager fixtures.
//!
//! Each fixture peer uses its system id as its local user id, so tests can
//! refer to "the user on peer 2" as `UserId(2)`.

use sharetree_core::{ContextConfig, SharedContext, SyncContext};
use sharetree_protocol::{AuthorityLevel, ElementId, ElementKind, SystemId, UserId};
use sharetree_sync_engine::{MockChannel, SyncConfig, SyncManager};
use std::sync::Arc;

/// A manager wired to a mock channel.
pub type TestManager = SyncManager<Arc<MockChannel>>;

/// Configuration for a fixture peer.
pub fn context_config(system: u32, authority: AuthorityLevel) -> ContextConfig {
    ContextConfig::new()
        .with_system_id(SystemId::new(system).expect("system id must be non-zero"))
        .with_authority(authority)
        .with_local_user(UserId(system))
}

/// A standalone context.
pub fn test_context(system: u32, authority: AuthorityLevel) -> SyncContext {
    SyncContext::new(context_config(system, authority))
}

/// A manager over a fresh context and mock channel.
pub fn test_manager(system: u32, authority: AuthorityLevel) -> TestManager {
    SyncManager::new(
        SyncConfig::new(format!("peer{system}")),
        SharedContext::new(test_context(system, authority)),
        Arc::new(MockChannel::new()),
    )
}

/// Ids of the elements built by [`build_sample_tree`].
#[derive(Debug, Clone, Copy)]
pub struct SampleTree {
    /// `scene` object of type `Scene`.
    pub scene: ElementId,
    /// `scene/title` string.
    pub title: ElementId,
    /// `scene/score` Int32.
    pub score: ElementId,
    /// `scene/tags` string array holding `a`, `b`.
    pub tags: ElementId,
}

/// Builds a small tree under the root of `ctx`.
pub fn build_sample_tree(ctx: &mut SyncContext) -> SampleTree {
    let root = ctx.root_id();
    let scene = ctx
        .create_object(root, "scene", "Scene", None)
        .expect("create scene");
    let title = ctx
        .create_child(scene, ElementKind::String, "title", None, Some("untitled".into()))
        .expect("create title");
    let score = ctx
        .create_child(scene, ElementKind::Int32, "score", None, Some(0.into()))
        .expect("create score");
    let tags = ctx
        .create_child(scene, ElementKind::StringArray, "tags", None, None)
        .expect("create tags");
    ctx.array_insert(tags, 0, "a").expect("insert a");
    ctx.array_insert(tags, 1, "b").expect("insert b");
    SampleTree {
        scene,
        title,
        score,
        tags,
    }
}
