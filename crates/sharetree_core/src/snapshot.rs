//! Snapshot export and restore.
//!
//! A snapshot is a plain, serde-serializable copy of a subtree used by
//! persistence layers. Owned elements are per-user session data and are
//! left out of snapshots.

use crate::context::SyncContext;
use crate::element::ElementBody;
use crate::error::{CoreError, CoreResult};
use crate::tree::ElementTree;
use serde::{Deserialize, Serialize};
use sharetree_codec::TypedValue;
use sharetree_protocol::{ElementId, ElementKind};

/// One element of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Element name.
    pub name: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Scalar value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TypedValue>,
    /// Array items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TypedValue>,
    /// Object type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Object children, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    /// Number of nodes in this snapshot, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SnapshotNode::node_count).sum::<usize>()
    }
}

/// Snapshots the subtree at `id`, skipping owned descendants.
pub fn snapshot(tree: &ElementTree, id: ElementId) -> Option<SnapshotNode> {
    let element = tree.get(id)?;
    let mut node = SnapshotNode {
        name: element.name().to_string(),
        kind: element.kind(),
        value: None,
        items: Vec::new(),
        object_type: None,
        children: Vec::new(),
    };
    match element.body() {
        ElementBody::Scalar(value) => node.value = Some(value.clone()),
        ElementBody::Array(items) => node.items = items.clone(),
        ElementBody::Object { object_type, children } => {
            node.object_type = Some(object_type.clone());
            node.children = children
                .iter()
                .filter(|child| tree.get(**child).is_some_and(|c| c.owner().is_none()))
                .filter_map(|child| snapshot(tree, *child))
                .collect();
        }
    }
    Some(node)
}

impl SyncContext {
    /// Snapshots the whole tree.
    pub fn snapshot(&self) -> SnapshotNode {
        snapshot(self.tree(), self.root_id()).unwrap_or(SnapshotNode {
            name: crate::tree::ROOT_NAME.to_string(),
            kind: ElementKind::Object,
            value: None,
            items: Vec::new(),
            object_type: None,
            children: Vec::new(),
        })
    }

    /// Recreates the children of a root snapshot under the root, as local
    /// operations that will be sent to peers. Returns the number of
    /// elements created.
    ///
    /// # Errors
    ///
    /// Fails if any element cannot be created, e.g. a name that is already
    /// taken. Nothing is created or queued in that case.
    pub fn restore(&mut self, snapshot: &SnapshotNode) -> CoreResult<usize> {
        let root = self.root_id();
        self.restore_all(root, &snapshot.children)
    }

    /// Recreates `node` and its subtree as a child of `parent`. Returns the
    /// number of elements created.
    ///
    /// # Errors
    ///
    /// As for [`create_child`](SyncContext::create_child). Nothing is created
    /// or queued on failure.
    pub fn restore_under(&mut self, parent: ElementId, node: &SnapshotNode) -> CoreResult<usize> {
        self.restore_all(parent, std::slice::from_ref(node))
    }

    fn restore_all(&mut self, parent: ElementId, nodes: &[SnapshotNode]) -> CoreResult<usize> {
        let queued = self.outbound_len();
        let mut created = Vec::new();
        for node in nodes {
            if let Err(err) = self.rebuild(parent, node, &mut created) {
                self.roll_back_local(queued, &created);
                return Err(err);
            }
        }
        Ok(created.len())
    }

    fn rebuild(&mut self, parent: ElementId, node: &SnapshotNode, created: &mut Vec<ElementId>) -> CoreResult<()> {
        let starting = if node.kind.is_object() {
            Some(TypedValue::from(node.object_type.clone().unwrap_or_default()))
        } else if node.kind.is_array() {
            None
        } else {
            Some(
                node.value
                    .clone()
                    .ok_or_else(|| CoreError::invalid_operation(format!("snapshot of '{}' has no value", node.name)))?,
            )
        };
        let id = self.create_child(parent, node.kind, &node.name, None, starting)?;
        created.push(id);
        for (index, item) in node.items.iter().enumerate() {
            self.array_insert(id, index, item.clone())?;
        }
        for child in &node.children {
            self.rebuild(id, child, created)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use sharetree_protocol::{SystemId, UserId};

    fn context(system: u32) -> SyncContext {
        SyncContext::new(ContextConfig::new().with_system_id(SystemId::new(system).unwrap()))
    }

    fn populated() -> SyncContext {
        let mut ctx = context(1);
        let root = ctx.root_id();
        let scene = ctx.create_object(root, "scene", "Scene", None).unwrap();
        ctx.create_child(scene, ElementKind::String, "title", None, Some("demo".into()))
            .unwrap();
        let xs = ctx.create_child(scene, ElementKind::Float32Array, "xs", None, None).unwrap();
        ctx.array_insert(xs, 0, 1.5f32).unwrap();
        ctx.array_insert(xs, 1, 2.5f32).unwrap();
        ctx.create_object(root, "cursor", "Cursor", Some(UserId(4))).unwrap();
        ctx
    }

    #[test]
    fn owned_elements_are_skipped() {
        let ctx = populated();
        let snap = ctx.snapshot();
        assert_eq!(snap.children.len(), 1);
        assert_eq!(snap.children[0].name, "scene");
        assert_eq!(snap.node_count(), 4);
    }

    #[test]
    fn restore_rebuilds_content() {
        let source = populated();
        let snap = source.snapshot();

        let mut target = context(2);
        assert_eq!(target.restore(&snap).unwrap(), 3);
        assert_eq!(target.snapshot(), snap);
        assert_eq!(target.drain_outbound().len(), 5);
    }

    #[test]
    fn restore_into_occupied_name_fails() {
        let mut ctx = populated();
        let snap = ctx.snapshot();
        let err = ctx.restore(&snap).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateName { .. }));
    }

    #[test]
    fn failed_restore_leaves_tree_unchanged() {
        let mut source = context(1);
        let root = source.root_id();
        source
            .create_child(root, ElementKind::Int32, "a", None, Some(1.into()))
            .unwrap();
        let xs = source.create_child(root, ElementKind::Int32Array, "xs", None, None).unwrap();
        source.array_insert(xs, 0, 7).unwrap();
        source
            .create_child(root, ElementKind::Bool, "b", None, Some(true.into()))
            .unwrap();
        let snap = source.snapshot();

        let mut target = context(2);
        let root = target.root_id();
        target
            .create_child(root, ElementKind::Bool, "b", None, Some(false.into()))
            .unwrap();
        let before = target.snapshot();
        let len = target.tree().len();
        let queued = target.outbound_len();

        let err = target.restore(&snap).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateName { .. }));
        assert_eq!(target.tree().len(), len);
        assert_eq!(target.outbound_len(), queued);
        assert_eq!(target.snapshot(), before);
        assert!(target.tree().child_named(root, "a").is_none());
    }

    #[test]
    fn serializes_to_json() {
        let snap = populated().snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SnapshotNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
        assert!(json.contains("\"title\""));
    }
}
