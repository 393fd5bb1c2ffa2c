//! Tag-keyed operation construction.

use crate::authority::AuthorityLevel;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::ElementId;
use crate::operation::{ElementSeed, OpBody, Operation, OperationType};
use sharetree_codec::{CodecError, CodecResult, WireReader};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Smallest encoding of an operation: tag, target, authority and an empty
/// ancestor count.
pub(crate) const MIN_OPERATION_SIZE: usize = 1 + 8 + 1 + 4;

/// Common fields every operation carries ahead of its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OpHeader {
    /// Target element.
    pub target: ElementId,
    /// Sender authority.
    pub authority: AuthorityLevel,
    /// Parent chain of the target.
    pub ancestors: Vec<ElementId>,
}

impl OpHeader {
    fn decode_from(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let target = ElementId::from_raw(reader.read_u64()?);
        let code = reader.read_u8()?;
        let authority =
            AuthorityLevel::from_code(code).ok_or(CodecError::unknown_tag("authority", code))?;
        let count = reader.read_len()?;
        let mut ancestors = Vec::with_capacity(reader.capacity_for(count, 8));
        for _ in 0..count {
            ancestors.push(ElementId::from_raw(reader.read_u64()?));
        }
        Ok(Self {
            target,
            authority,
            ancestors,
        })
    }

    fn with_body(self, body: OpBody) -> Operation {
        Operation {
            target: self.target,
            authority: self.authority,
            ancestors: self.ancestors,
            body,
        }
    }
}

/// Builds an operation from its header and the payload bytes that follow.
pub type OperationMaker = fn(OpHeader, &mut WireReader<'_>) -> CodecResult<Operation>;

/// Maps operation tags to constructors.
///
/// Registering a tag that is already present replaces the previous
/// constructor, which lets tests inject doubles.
#[derive(Clone)]
pub struct OperationFactory {
    makers: HashMap<u8, OperationMaker>,
}

impl OperationFactory {
    /// Creates a factory with no registrations.
    pub fn empty() -> Self {
        Self {
            makers: HashMap::new(),
        }
    }

    /// Creates a factory with every built-in operation type registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register(OperationType::Ack.to_code(), make_ack);
        factory.register(OperationType::Noop.to_code(), make_noop);
        factory.register(OperationType::Create.to_code(), make_create);
        factory.register(OperationType::Modify.to_code(), make_modify);
        factory.register(OperationType::Delete.to_code(), make_delete);
        factory.register(OperationType::Insert.to_code(), make_insert);
        factory.register(OperationType::Update.to_code(), make_update);
        factory.register(OperationType::Remove.to_code(), make_remove);
        factory.register(OperationType::Replace.to_code(), make_replace);
        factory
    }

    /// Returns a shared factory holding the built-in registrations.
    pub fn builtin() -> &'static OperationFactory {
        static BUILTIN: OnceLock<OperationFactory> = OnceLock::new();
        BUILTIN.get_or_init(OperationFactory::new)
    }

    /// Registers a constructor for `tag`, replacing any existing one.
    pub fn register(&mut self, tag: u8, maker: OperationMaker) {
        self.makers.insert(tag, maker);
    }

    /// Returns whether `tag` has a constructor.
    pub fn is_registered(&self, tag: u8) -> bool {
        self.makers.contains_key(&tag)
    }

    /// Builds an operation of kind `tag` from a decoded header and the
    /// payload bytes in `reader`.
    pub fn create(
        &self,
        tag: u8,
        header: OpHeader,
        reader: &mut WireReader<'_>,
    ) -> ProtocolResult<Operation> {
        let maker = self
            .makers
            .get(&tag)
            .ok_or(ProtocolError::UnknownKind { tag })?;
        Ok(maker(header, reader)?)
    }

    /// Reads one complete operation, leaving following bytes unread.
    pub fn decode_from(&self, reader: &mut WireReader<'_>) -> ProtocolResult<Operation> {
        let tag = reader.read_u8()?;
        if !self.is_registered(tag) {
            return Err(ProtocolError::UnknownKind { tag });
        }
        let header = OpHeader::decode_from(reader)?;
        self.create(tag, header, reader)
    }

    /// Decodes an operation that must span all of `bytes`.
    pub fn decode_bytes(&self, bytes: &[u8]) -> ProtocolResult<Operation> {
        let mut reader = WireReader::new(bytes);
        let op = self.decode_from(&mut reader)?;
        reader.finish()?;
        Ok(op)
    }
}

impl Default for OperationFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn make_ack(header: OpHeader, _: &mut WireReader<'_>) -> CodecResult<Operation> {
    Ok(header.with_body(OpBody::Ack))
}

fn make_noop(header: OpHeader, _: &mut WireReader<'_>) -> CodecResult<Operation> {
    Ok(header.with_body(OpBody::Noop))
}

fn make_create(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let seed = ElementSeed::decode_from(reader)?;
    Ok(header.with_body(OpBody::Create(seed)))
}

fn make_modify(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let value = reader.read_value()?;
    Ok(header.with_body(OpBody::Modify { value }))
}

fn make_delete(header: OpHeader, _: &mut WireReader<'_>) -> CodecResult<Operation> {
    Ok(header.with_body(OpBody::Delete))
}

fn make_insert(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let index = reader.read_u32()?;
    let value = reader.read_value()?;
    Ok(header.with_body(OpBody::Insert { index, value }))
}

fn make_update(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let index = reader.read_u32()?;
    let value = reader.read_value()?;
    Ok(header.with_body(OpBody::Update { index, value }))
}

fn make_remove(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let index = reader.read_u32()?;
    Ok(header.with_body(OpBody::Remove { index }))
}

fn make_replace(header: OpHeader, reader: &mut WireReader<'_>) -> CodecResult<Operation> {
    let replaced = ElementId::from_raw(reader.read_u64()?);
    let seed = ElementSeed::decode_from(reader)?;
    Ok(header.with_body(OpBody::Replace { replaced, seed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharetree_codec::TypedValue;

    #[test]
    fn builtin_registers_every_type() {
        let factory = OperationFactory::new();
        for ty in OperationType::ALL {
            assert!(factory.is_registered(ty.to_code()), "{}", ty.name());
        }
    }

    #[test]
    fn unknown_tag_is_reported() {
        let bytes = [0xee, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        assert_eq!(
            OperationFactory::new().decode_bytes(&bytes),
            Err(ProtocolError::UnknownKind { tag: 0xee })
        );
    }

    #[test]
    fn empty_factory_rejects_everything() {
        let op = Operation::ack(AuthorityLevel::Low);
        let bytes = op.encode().unwrap();
        assert!(matches!(
            OperationFactory::empty().decode_bytes(&bytes),
            Err(ProtocolError::UnknownKind { .. })
        ));
    }

    #[test]
    fn registration_is_last_wins() {
        fn always_noop(header: OpHeader, _: &mut WireReader<'_>) -> CodecResult<Operation> {
            Ok(Operation::noop(header.authority))
        }

        let mut factory = OperationFactory::new();
        factory.register(OperationType::Delete.to_code(), always_noop);

        let op = Operation::delete(ElementId::from_raw(5), AuthorityLevel::High, vec![]);
        let decoded = factory.decode_bytes(&op.encode().unwrap()).unwrap();
        assert!(decoded.is_noop());
        assert_eq!(decoded.authority, AuthorityLevel::High);
    }

    #[test]
    fn truncated_payload_is_decode_error() {
        let op = Operation::insert(
            ElementId::from_raw(5),
            AuthorityLevel::Low,
            vec![],
            1,
            TypedValue::Int64(9),
        );
        let bytes = op.encode().unwrap();
        let err = OperationFactory::new()
            .decode_bytes(&bytes[..bytes.len() - 1])
            .unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn bad_authority_is_decode_error() {
        let mut bytes = Operation::delete(ElementId::from_raw(5), AuthorityLevel::Low, vec![])
            .encode()
            .unwrap();
        bytes[9] = 0;
        assert_eq!(
            OperationFactory::new().decode_bytes(&bytes),
            Err(ProtocolError::Codec(CodecError::unknown_tag("authority", 0)))
        );
    }
}
