//! Elements of the replicated tree.

use sharetree_codec::TypedValue;
use sharetree_protocol::{ElementId, ElementKind, UserId};

/// Kind-specific contents of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementBody {
    /// A leaf holding one value.
    Scalar(TypedValue),
    /// An ordered sequence of values of one kind.
    Array(Vec<TypedValue>),
    /// A container of named children, in insertion order.
    Object {
        /// Application-defined schema tag.
        object_type: String,
        /// Child ids; the children live in the tree's arena.
        children: Vec<ElementId>,
    },
}

/// One node of the tree.
///
/// Parents are referenced by id, never owned; an object owns its children
/// through the tree arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub(crate) id: ElementId,
    pub(crate) name: String,
    pub(crate) parent: Option<ElementId>,
    pub(crate) owner: Option<UserId>,
    pub(crate) kind: ElementKind,
    pub(crate) body: ElementBody,
}

impl Element {
    pub(crate) fn new(
        id: ElementId,
        name: String,
        parent: Option<ElementId>,
        owner: Option<UserId>,
        kind: ElementKind,
        body: ElementBody,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            owner,
            kind,
            body,
        }
    }

    /// Element id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Name, unique among siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent id; `None` only for the root.
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Owning user, if the element is ephemeral.
    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Kind-specific contents.
    pub fn body(&self) -> &ElementBody {
        &self.body
    }

    /// Value of a scalar element.
    pub fn value(&self) -> Option<&TypedValue> {
        match &self.body {
            ElementBody::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Items of an array element.
    pub fn items(&self) -> Option<&[TypedValue]> {
        match &self.body {
            ElementBody::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Item `index` of an array element.
    pub fn item(&self, index: usize) -> Option<&TypedValue> {
        self.items()?.get(index)
    }

    /// Schema tag of an object element.
    pub fn object_type(&self) -> Option<&str> {
        match &self.body {
            ElementBody::Object { object_type, .. } => Some(object_type),
            _ => None,
        }
    }

    /// Child ids of an object element; empty for other kinds.
    pub fn children(&self) -> &[ElementId] {
        match &self.body {
            ElementBody::Object { children, .. } => children,
            _ => &[],
        }
    }

    /// Whether this is an object element.
    pub fn is_object(&self) -> bool {
        matches!(self.body, ElementBody::Object { .. })
    }
}
