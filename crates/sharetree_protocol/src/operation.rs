//! Replicated operations.

use crate::authority::AuthorityLevel;
use crate::error::ProtocolResult;
use crate::factory::OperationFactory;
use crate::ids::{ElementId, UserId};
use crate::kind::ElementKind;
use sharetree_codec::{
    CodecError, CodecResult, Encode, TypedValue, WireReader, WireWriter,
};
use std::fmt;

/// Type of an operation; the discriminant is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum OperationType {
    /// Version-only message carrying no mutation.
    Ack = 1,
    /// Mutation discarded by a transform.
    Noop = 2,
    /// Creates a child element.
    Create = 3,
    /// Sets a scalar element's value.
    Modify = 4,
    /// Deletes an element and its subtree.
    Delete = 5,
    /// Inserts an array item.
    Insert = 6,
    /// Sets an array item.
    Update = 7,
    /// Removes an array item.
    Remove = 8,
    /// Replaces the element occupying a name slot.
    Replace = 9,
}

impl OperationType {
    /// All types, in tag order.
    pub const ALL: [OperationType; 9] = [
        Self::Ack,
        Self::Noop,
        Self::Create,
        Self::Modify,
        Self::Delete,
        Self::Insert,
        Self::Update,
        Self::Remove,
        Self::Replace,
    ];

    /// Converts to the wire tag.
    pub fn to_code(self) -> u8 {
        self as u8
    }

    /// Converts from a wire tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code).checked_sub(1)?).copied()
    }

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "Ack",
            Self::Noop => "Noop",
            Self::Create => "Create",
            Self::Modify => "Modify",
            Self::Delete => "Delete",
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Remove => "Remove",
            Self::Replace => "Replace",
        }
    }
}

/// Everything needed to construct an element on a remote peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSeed {
    /// Kind of the new element.
    pub kind: ElementKind,
    /// Name, unique among its siblings.
    pub name: String,
    /// Owning user; owned elements are removed when the session ends.
    pub owner: Option<UserId>,
    /// Starting value: the scalar value for leaves, the object type string
    /// for objects, absent for arrays.
    pub value: Option<TypedValue>,
}

impl ElementSeed {
    /// Creates a seed.
    pub fn new(
        kind: ElementKind,
        name: impl Into<String>,
        owner: Option<UserId>,
        value: Option<TypedValue>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            owner,
            value,
        }
    }

    pub(crate) fn encode_to(&self, writer: &mut WireWriter) -> CodecResult<()> {
        writer.put_u8(self.kind.to_code());
        writer.put_str(&self.name)?;
        match self.owner {
            Some(owner) => {
                writer.put_bool(true);
                writer.put_u32(owner.0);
            }
            None => writer.put_bool(false),
        }
        writer.put_optional_value(self.value.as_ref())
    }

    pub(crate) fn decode_from(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let tag = reader.read_u8()?;
        let kind = ElementKind::from_code(tag).ok_or(CodecError::unknown_tag("element kind", tag))?;
        let name = reader.read_str()?;
        let owner = if reader.read_bool()? {
            Some(UserId(reader.read_u32()?))
        } else {
            None
        };
        let value = reader.read_optional_value()?;
        Ok(Self {
            kind,
            name,
            owner,
            value,
        })
    }
}

/// Variant-specific payload of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpBody {
    /// Acknowledges received operations; never applied.
    Ack,
    /// Does nothing.
    Noop,
    /// Creates the target as a child of the first ancestor.
    Create(ElementSeed),
    /// Sets the value of a scalar target (or the type of an object target).
    Modify {
        /// The new value.
        value: TypedValue,
    },
    /// Sets one item of an array target.
    Update {
        /// Item position.
        index: u32,
        /// The new value.
        value: TypedValue,
    },
    /// Deletes the target and its subtree.
    Delete,
    /// Inserts an item into an array target.
    Insert {
        /// Position of the new item.
        index: u32,
        /// The inserted value.
        value: TypedValue,
    },
    /// Removes an item from an array target.
    Remove {
        /// Position of the removed item.
        index: u32,
    },
    /// Removes whatever child occupies the seed's name slot, then creates
    /// the target in its place.
    Replace {
        /// The element being displaced, if known.
        replaced: ElementId,
        /// The replacement element.
        seed: ElementSeed,
    },
}

/// One mutation of the tree, sufficient to replay it on another peer.
///
/// `ancestors` holds the target's parent, grandparent and so on up to but
/// excluding the root, captured when the operation was generated. An empty
/// path means the parent is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Element the operation acts on.
    pub target: ElementId,
    /// Authority of the peer that last applied and sent the operation.
    pub authority: AuthorityLevel,
    /// Parent chain of the target, nearest first, root excluded.
    pub ancestors: Vec<ElementId>,
    /// Variant-specific payload.
    pub body: OpBody,
}

impl Operation {
    fn new(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        body: OpBody,
    ) -> Self {
        Self {
            target,
            authority,
            ancestors,
            body,
        }
    }

    /// Creates an Ack.
    pub fn ack(authority: AuthorityLevel) -> Self {
        Self::new(ElementId::ROOT, authority, Vec::new(), OpBody::Ack)
    }

    /// Creates a Noop.
    pub fn noop(authority: AuthorityLevel) -> Self {
        Self::new(ElementId::ROOT, authority, Vec::new(), OpBody::Noop)
    }

    /// Creates a Create for `target` under the first entry of `ancestors`.
    pub fn create(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        seed: ElementSeed,
    ) -> Self {
        Self::new(target, authority, ancestors, OpBody::Create(seed))
    }

    /// Creates a scalar Modify.
    pub fn modify(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        value: TypedValue,
    ) -> Self {
        Self::new(target, authority, ancestors, OpBody::Modify { value })
    }

    /// Creates an array Update.
    pub fn update(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        index: u32,
        value: TypedValue,
    ) -> Self {
        Self::new(target, authority, ancestors, OpBody::Update { index, value })
    }

    /// Creates a Delete.
    pub fn delete(target: ElementId, authority: AuthorityLevel, ancestors: Vec<ElementId>) -> Self {
        Self::new(target, authority, ancestors, OpBody::Delete)
    }

    /// Creates an array Insert.
    pub fn insert(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        index: u32,
        value: TypedValue,
    ) -> Self {
        Self::new(target, authority, ancestors, OpBody::Insert { index, value })
    }

    /// Creates an array Remove.
    pub fn remove(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        index: u32,
    ) -> Self {
        Self::new(target, authority, ancestors, OpBody::Remove { index })
    }

    /// Creates a Replace.
    pub fn replace(
        target: ElementId,
        authority: AuthorityLevel,
        ancestors: Vec<ElementId>,
        replaced: ElementId,
        seed: ElementSeed,
    ) -> Self {
        Self::new(
            target,
            authority,
            ancestors,
            OpBody::Replace { replaced, seed },
        )
    }

    /// Returns the operation type.
    pub fn op_type(&self) -> OperationType {
        match &self.body {
            OpBody::Ack => OperationType::Ack,
            OpBody::Noop => OperationType::Noop,
            OpBody::Create(_) => OperationType::Create,
            OpBody::Modify { .. } => OperationType::Modify,
            OpBody::Update { .. } => OperationType::Update,
            OpBody::Delete => OperationType::Delete,
            OpBody::Insert { .. } => OperationType::Insert,
            OpBody::Remove { .. } => OperationType::Remove,
            OpBody::Replace { .. } => OperationType::Replace,
        }
    }

    /// Returns true for Noop.
    pub fn is_noop(&self) -> bool {
        matches!(self.body, OpBody::Noop)
    }

    /// Returns true for Ack.
    pub fn is_ack(&self) -> bool {
        matches!(self.body, OpBody::Ack)
    }

    /// Returns a Noop carrying this operation's authority.
    pub fn to_noop(&self) -> Self {
        Self::noop(self.authority)
    }

    /// Returns this operation restamped with another authority.
    pub fn with_authority(mut self, authority: AuthorityLevel) -> Self {
        self.authority = authority;
        self
    }

    /// The parent of the target: the first ancestor, or the root.
    pub fn parent(&self) -> ElementId {
        self.ancestors.first().copied().unwrap_or(ElementId::ROOT)
    }

    /// Whether `id` is a proper ancestor of the target.
    pub fn is_descendant_of(&self, id: ElementId) -> bool {
        if id.is_root() {
            return !self.target.is_root();
        }
        self.ancestors.contains(&id)
    }

    /// Whether the operation acts on `id` or anything below it.
    pub fn affects(&self, id: ElementId) -> bool {
        self.target == id || self.is_descendant_of(id)
    }

    /// Seed of a Create or Replace.
    pub fn seed(&self) -> Option<&ElementSeed> {
        match &self.body {
            OpBody::Create(seed) | OpBody::Replace { seed, .. } => Some(seed),
            _ => None,
        }
    }

    /// Whether two Create/Replace operations claim the same name under the
    /// same parent.
    pub fn same_slot(&self, other: &Operation) -> bool {
        match (self.seed(), other.seed()) {
            (Some(a), Some(b)) => self.parent() == other.parent() && a.name == b.name,
            _ => false,
        }
    }

    /// Array index of Update/Insert/Remove.
    pub fn index(&self) -> Option<u32> {
        match &self.body {
            OpBody::Update { index, .. }
            | OpBody::Insert { index, .. }
            | OpBody::Remove { index } => Some(*index),
            _ => None,
        }
    }

    /// Returns a copy with the array index replaced. Non-array operations
    /// are returned unchanged.
    pub fn with_index(&self, new_index: u32) -> Self {
        let mut op = self.clone();
        match &mut op.body {
            OpBody::Update { index, .. }
            | OpBody::Insert { index, .. }
            | OpBody::Remove { index } => *index = new_index,
            _ => {}
        }
        op
    }

    /// Converts a Create into a Replace displacing `replaced`.
    pub fn into_replace(self, replaced: ElementId) -> Self {
        match self.body {
            OpBody::Create(seed) | OpBody::Replace { seed, .. } => Self {
                body: OpBody::Replace { replaced, seed },
                ..self
            },
            _ => self,
        }
    }

    /// Returns the value carried by Modify/Update/Insert.
    pub fn value(&self) -> Option<&TypedValue> {
        match &self.body {
            OpBody::Modify { value } | OpBody::Update { value, .. } | OpBody::Insert { value, .. } => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Encodes to wire bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut writer = WireWriter::new();
        self.encode_to(&mut writer)?;
        Ok(writer.into_bytes().to_vec())
    }

    /// Decodes from wire bytes using the built-in operation factory.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        OperationFactory::builtin().decode_bytes(bytes)
    }

    /// Writes the variant-specific payload.
    fn encode_payload(&self, writer: &mut WireWriter) -> CodecResult<()> {
        match &self.body {
            OpBody::Ack | OpBody::Noop | OpBody::Delete => Ok(()),
            OpBody::Create(seed) => seed.encode_to(writer),
            OpBody::Modify { value } => writer.put_value(value),
            OpBody::Update { index, value } | OpBody::Insert { index, value } => {
                writer.put_u32(*index);
                writer.put_value(value)
            }
            OpBody::Remove { index } => {
                writer.put_u32(*index);
                Ok(())
            }
            OpBody::Replace { replaced, seed } => {
                writer.put_u64(replaced.as_u64());
                seed.encode_to(writer)
            }
        }
    }
}

impl Encode for Operation {
    fn encode_to(&self, writer: &mut WireWriter) -> CodecResult<()> {
        writer.put_u8(self.op_type().to_code());
        writer.put_u64(self.target.as_u64());
        writer.put_u8(self.authority.to_code());
        writer.put_len(self.ancestors.len())?;
        for ancestor in &self.ancestors {
            writer.put_u64(ancestor.as_u64());
        }
        self.encode_payload(writer)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            OpBody::Ack => write!(f, "Ack"),
            OpBody::Noop => write!(f, "Noop"),
            OpBody::Create(seed) => write!(
                f,
                "Create {} '{}' ({}) under {}",
                seed.kind,
                seed.name,
                self.target,
                self.parent()
            ),
            OpBody::Modify { value } => write!(f, "Modify {} = {}", self.target, value),
            OpBody::Update { index, value } => {
                write!(f, "Update {}[{}] = {}", self.target, index, value)
            }
            OpBody::Delete => write!(f, "Delete {}", self.target),
            OpBody::Insert { index, value } => {
                write!(f, "Insert {}[{}] = {}", self.target, index, value)
            }
            OpBody::Remove { index } => write!(f, "Remove {}[{}]", self.target, index),
            OpBody::Replace { replaced, seed } => write!(
                f,
                "Replace {} with {} '{}' ({}) under {}",
                replaced,
                seed.kind,
                seed.name,
                self.target,
                self.parent()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ElementId {
        ElementId::from_raw((1 << 32) | n)
    }

    #[test]
    fn operation_type_codes() {
        for ty in OperationType::ALL {
            assert_eq!(OperationType::from_code(ty.to_code()), Some(ty));
        }
        assert_eq!(OperationType::from_code(0), None);
        assert_eq!(OperationType::from_code(10), None);
    }

    #[test]
    fn modify_wire_layout() {
        let op = Operation::modify(id(2), AuthorityLevel::High, vec![id(1)], TypedValue::Int32(10));
        let bytes = op.encode().unwrap();
        let mut expected = vec![OperationType::Modify.to_code()];
        expected.extend_from_slice(&id(2).as_u64().to_be_bytes());
        expected.push(AuthorityLevel::High.to_code());
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(&id(1).as_u64().to_be_bytes());
        expected.push(2);
        expected.extend_from_slice(&10i32.to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn create_roundtrip() {
        let op = Operation::create(
            id(3),
            AuthorityLevel::Low,
            vec![id(1)],
            ElementSeed::new(
                ElementKind::Int32,
                "score",
                Some(UserId(4)),
                Some(TypedValue::Int32(0)),
            ),
        );
        let decoded = Operation::decode(&op.encode().unwrap()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn replace_roundtrip() {
        let op = Operation::replace(
            id(3),
            AuthorityLevel::Medium,
            vec![],
            id(7),
            ElementSeed::new(ElementKind::StringArray, "names", None, None),
        );
        let decoded = Operation::decode(&op.encode().unwrap()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn parent_defaults_to_root() {
        let op = Operation::delete(id(1), AuthorityLevel::Low, vec![]);
        assert_eq!(op.parent(), ElementId::ROOT);
        assert!(op.is_descendant_of(ElementId::ROOT));

        let nested = Operation::delete(id(3), AuthorityLevel::Low, vec![id(2), id(1)]);
        assert_eq!(nested.parent(), id(2));
        assert!(nested.is_descendant_of(id(1)));
        assert!(nested.affects(id(3)));
        assert!(!nested.affects(id(4)));
    }

    #[test]
    fn same_slot_compares_parent_and_name() {
        let seed = |name: &str| ElementSeed::new(ElementKind::Bool, name, None, None);
        let a = Operation::create(id(1), AuthorityLevel::Low, vec![], seed("x"));
        let b = Operation::create(id(2), AuthorityLevel::Low, vec![], seed("x"));
        let c = Operation::create(id(3), AuthorityLevel::Low, vec![id(9)], seed("x"));
        let d = Operation::create(id(4), AuthorityLevel::Low, vec![], seed("y"));
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&c));
        assert!(!a.same_slot(&d));
    }

    #[test]
    fn with_index_touches_only_array_ops() {
        let insert = Operation::insert(id(1), AuthorityLevel::Low, vec![], 2, TypedValue::Int32(1));
        assert_eq!(insert.with_index(5).index(), Some(5));
        let delete = Operation::delete(id(1), AuthorityLevel::Low, vec![]);
        assert_eq!(delete.with_index(5), delete);
    }

    #[test]
    fn create_becomes_replace() {
        let op = Operation::create(
            id(1),
            AuthorityLevel::Low,
            vec![],
            ElementSeed::new(ElementKind::Object, "o", None, None),
        );
        let replaced = op.into_replace(id(9));
        assert_eq!(replaced.op_type(), OperationType::Replace);
        assert!(matches!(replaced.body, OpBody::Replace { replaced, .. } if replaced == id(9)));
    }

    #[test]
    fn description() {
        let op = Operation::insert(
            ElementId::from_raw((1 << 32) | 2),
            AuthorityLevel::Low,
            vec![],
            0,
            TypedValue::from("a"),
        );
        assert_eq!(op.to_string(), "Insert 00000001.2[0] = \"a\"");
    }
}
