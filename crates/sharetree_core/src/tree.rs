//! The element arena.

use crate::element::{Element, ElementBody};
use crate::error::{CoreError, CoreResult};
use sharetree_codec::TypedValue;
use sharetree_protocol::{ElementId, ElementKind, UserId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Name of the root object.
pub const ROOT_NAME: &str = "Root";

/// One peer's copy of the replicated tree.
///
/// All elements live in a single id-keyed arena. Objects list their
/// children by id, children point at their parent by id.
///
/// # Invariants
///
/// - The root is present and is the only element without a parent
/// - Every other element's parent is present, is an object, and lists it
/// - Sibling names are unique
#[derive(Debug, Clone)]
pub struct ElementTree {
    nodes: HashMap<ElementId, Element>,
}

impl ElementTree {
    /// Creates a tree holding only the root object.
    pub fn new() -> Self {
        let root = Element::new(
            ElementId::ROOT,
            ROOT_NAME.to_string(),
            None,
            None,
            ElementKind::Object,
            ElementBody::Object {
                object_type: ROOT_NAME.to_string(),
                children: Vec::new(),
            },
        );
        let mut nodes = HashMap::new();
        nodes.insert(ElementId::ROOT, root);
        Self { nodes }
    }

    /// The root id.
    pub fn root_id(&self) -> ElementId {
        ElementId::ROOT
    }

    /// Looks up an element.
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.nodes.get_mut(&id)
    }

    /// Whether the element is present.
    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of elements, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Finds a child of `parent` by name.
    pub fn child_named(&self, parent: ElementId, name: &str) -> Option<&Element> {
        self.get(parent)?
            .children()
            .iter()
            .filter_map(|id| self.get(*id))
            .find(|child| child.name == name)
    }

    /// Parent chain of `id`, nearest first, root excluded. `None` if the
    /// element is absent.
    pub fn ancestors_of(&self, id: ElementId) -> Option<Vec<ElementId>> {
        let mut path = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            if parent.is_root() {
                break;
            }
            path.push(parent);
            current = self.get(parent)?.parent;
        }
        Some(path)
    }

    /// Ancestor path for a new child of `parent`.
    pub fn path_for_child(&self, parent: ElementId) -> Option<Vec<ElementId>> {
        if parent.is_root() {
            return self.contains(parent).then(Vec::new);
        }
        let mut path = vec![parent];
        path.extend(self.ancestors_of(parent)?);
        Some(path)
    }

    /// Slash-separated name path, e.g. `/players/ada/score`.
    pub fn path_of(&self, id: ElementId) -> Option<String> {
        if id.is_root() {
            return self.contains(id).then(|| "/".to_string());
        }
        let mut names = vec![self.get(id)?.name.as_str()];
        for ancestor in self.ancestors_of(id)? {
            names.push(self.get(ancestor)?.name.as_str());
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    /// Ids of every element below `id`, depth-first pre-order.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self
            .get(id)
            .map(|e| e.children().iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(element) = self.get(next) {
                stack.extend(element.children().iter().rev().copied());
            }
        }
        out
    }

    /// Top-most elements whose owner satisfies `matches`; descendants of a
    /// match are not listed separately.
    pub fn owned_roots(&self, matches: impl Fn(Option<UserId>) -> bool) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![ElementId::ROOT];
        while let Some(id) = stack.pop() {
            let Some(element) = self.get(id) else { continue };
            if !id.is_root() && matches(element.owner) {
                out.push(id);
                continue;
            }
            stack.extend(element.children().iter().rev().copied());
        }
        out
    }

    /// Adds `element` under its parent.
    pub(crate) fn attach(&mut self, element: Element) -> CoreResult<()> {
        let parent_id = element
            .parent
            .ok_or_else(|| CoreError::invalid_operation("only the root may lack a parent"))?;
        if self.contains(element.id) {
            return Err(CoreError::invalid_operation(format!(
                "element {} already exists",
                element.id
            )));
        }
        if self.child_named(parent_id, &element.name).is_some() {
            return Err(CoreError::DuplicateName {
                parent: parent_id,
                name: element.name,
            });
        }
        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or(CoreError::not_found(parent_id))?;
        match &mut parent.body {
            ElementBody::Object { children, .. } => children.push(element.id),
            _ => return Err(CoreError::kind_mismatch(ElementKind::Object, parent.kind)),
        }
        self.nodes.insert(element.id, element);
        Ok(())
    }

    /// Removes `id` and everything below it. Returns the removed elements,
    /// `id` first, or `None` if absent.
    pub(crate) fn detach(&mut self, id: ElementId) -> Option<Vec<Element>> {
        if id.is_root() {
            return None;
        }
        let parent_id = self.get(id)?.parent;
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        if let Some(ElementBody::Object { children, .. }) =
            parent_id.and_then(|p| self.nodes.get_mut(&p)).map(|p| &mut p.body)
        {
            children.retain(|child| *child != id);
        }
        Some(ids.into_iter().filter_map(|i| self.nodes.remove(&i)).collect())
    }

    /// Content of every element keyed by id, with object children as sets.
    /// Two converged peers produce equal views.
    pub fn canonical_view(&self) -> BTreeMap<ElementId, NodeView> {
        self.nodes
            .values()
            .map(|e| {
                let view = NodeView {
                    name: e.name.clone(),
                    parent: e.parent,
                    owner: e.owner,
                    kind: e.kind,
                    value: e.value().cloned(),
                    items: e.items().map(<[TypedValue]>::to_vec).unwrap_or_default(),
                    object_type: e.object_type().map(str::to_string),
                    children: e.children().iter().copied().collect(),
                };
                (e.id, view)
            })
            .collect()
    }

    /// Renders the tree depth-first, one element per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(ElementId::ROOT, 0, &mut out);
        out
    }

    fn render_into(&self, id: ElementId, depth: usize, out: &mut String) {
        let Some(element) = self.get(id) else { return };
        let indent = "  ".repeat(depth);
        let detail = match &element.body {
            ElementBody::Scalar(value) => format!(" = {value}"),
            ElementBody::Array(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!(" = [{}]", rendered.join(", "))
            }
            ElementBody::Object { object_type, .. } if !object_type.is_empty() => {
                format!(" <{object_type}>")
            }
            ElementBody::Object { .. } => String::new(),
        };
        let owner = element
            .owner
            .map(|o| format!(" ({o})"))
            .unwrap_or_default();
        out.push_str(&format!(
            "{indent}{} [{}] {}{detail}{owner}\n",
            element.name, element.kind, element.id
        ));
        for child in element.children() {
            self.render_into(*child, depth + 1, out);
        }
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Comparable content of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    /// Element name.
    pub name: String,
    /// Parent id.
    pub parent: Option<ElementId>,
    /// Owning user.
    pub owner: Option<UserId>,
    /// Element kind.
    pub kind: ElementKind,
    /// Scalar value.
    pub value: Option<TypedValue>,
    /// Array items.
    pub items: Vec<TypedValue>,
    /// Object schema tag.
    pub object_type: Option<String>,
    /// Object children.
    pub children: BTreeSet<ElementId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ElementId {
        ElementId::from_raw((1 << 32) | n)
    }

    fn object(n: u64, name: &str, parent: ElementId) -> Element {
        Element::new(
            id(n),
            name.to_string(),
            Some(parent),
            None,
            ElementKind::Object,
            ElementBody::Object {
                object_type: String::new(),
                children: Vec::new(),
            },
        )
    }

    fn leaf(n: u64, name: &str, parent: ElementId, value: i32) -> Element {
        Element::new(
            id(n),
            name.to_string(),
            Some(parent),
            None,
            ElementKind::Int32,
            ElementBody::Scalar(TypedValue::Int32(value)),
        )
    }

    fn sample() -> ElementTree {
        let mut tree = ElementTree::new();
        tree.attach(object(1, "players", ElementId::ROOT)).unwrap();
        tree.attach(object(2, "ada", id(1))).unwrap();
        tree.attach(leaf(3, "score", id(2), 7)).unwrap();
        tree.attach(leaf(4, "round", ElementId::ROOT, 1)).unwrap();
        tree
    }

    #[test]
    fn new_tree_has_only_root() {
        let tree = ElementTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.get(ElementId::ROOT).unwrap().name(), ROOT_NAME);
    }

    #[test]
    fn ancestors_exclude_root() {
        let tree = sample();
        assert_eq!(tree.ancestors_of(id(3)).unwrap(), vec![id(2), id(1)]);
        assert_eq!(tree.ancestors_of(id(1)).unwrap(), Vec::<ElementId>::new());
        assert_eq!(tree.path_for_child(id(2)).unwrap(), vec![id(2), id(1)]);
        assert_eq!(tree.path_for_child(ElementId::ROOT).unwrap(), Vec::<ElementId>::new());
        assert!(tree.ancestors_of(id(99)).is_none());
    }

    #[test]
    fn paths() {
        let tree = sample();
        assert_eq!(tree.path_of(id(3)).unwrap(), "/players/ada/score");
        assert_eq!(tree.path_of(ElementId::ROOT).unwrap(), "/");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut tree = sample();
        let err = tree.attach(leaf(9, "round", ElementId::ROOT, 0)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateName { .. }));
        assert!(!tree.contains(id(9)));
    }

    #[test]
    fn attach_under_leaf_rejected() {
        let mut tree = sample();
        let err = tree.attach(leaf(9, "x", id(3), 0)).unwrap_err();
        assert!(matches!(err, CoreError::KindMismatch { .. }));
    }

    #[test]
    fn detach_removes_subtree() {
        let mut tree = sample();
        let removed = tree.detach(id(1)).unwrap();
        let removed_ids: Vec<_> = removed.iter().map(Element::id).collect();
        assert_eq!(removed_ids, vec![id(1), id(2), id(3)]);
        assert!(!tree.contains(id(3)));
        assert_eq!(tree.get(ElementId::ROOT).unwrap().children(), &[id(4)]);
        assert!(tree.detach(id(1)).is_none());
        assert!(tree.detach(ElementId::ROOT).is_none());
    }

    #[test]
    fn descendants_are_preorder() {
        let tree = sample();
        assert_eq!(tree.descendants(ElementId::ROOT), vec![id(1), id(2), id(3), id(4)]);
    }

    #[test]
    fn owned_roots_skip_nested_matches() {
        let mut tree = ElementTree::new();
        let mut owned = object(1, "cursor", ElementId::ROOT);
        owned.owner = Some(UserId(5));
        tree.attach(owned).unwrap();
        let mut nested = leaf(2, "x", id(1), 0);
        nested.owner = Some(UserId(5));
        tree.attach(nested).unwrap();
        tree.attach(leaf(3, "shared", ElementId::ROOT, 0)).unwrap();

        assert_eq!(tree.owned_roots(|o| o == Some(UserId(5))), vec![id(1)]);
        assert!(tree.owned_roots(|o| o == Some(UserId(6))).is_empty());
    }

    #[test]
    fn canonical_view_ignores_child_order() {
        let mut a = ElementTree::new();
        a.attach(leaf(1, "x", ElementId::ROOT, 0)).unwrap();
        a.attach(leaf(2, "y", ElementId::ROOT, 0)).unwrap();
        let mut b = ElementTree::new();
        b.attach(leaf(2, "y", ElementId::ROOT, 0)).unwrap();
        b.attach(leaf(1, "x", ElementId::ROOT, 0)).unwrap();
        assert_eq!(a.canonical_view(), b.canonical_view());
    }

    #[test]
    fn render_lists_every_element() {
        let rendered = sample().render();
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.contains("score [int32]"));
    }
}
