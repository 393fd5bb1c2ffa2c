//! Messages exchanged between peers.

use crate::authority::{AuthorityLevel, PeerRank};
use crate::error::ProtocolResult;
use crate::factory::{OperationFactory, MIN_OPERATION_SIZE};
use crate::ids::{SystemId, UserId};
use crate::oplog::{OperationalState, VersionedOp};
use sharetree_codec::{Bytes, CodecError, CodecResult, Encode, WireReader, WireWriter};

/// Version of the message format spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;

/// A message on a peer link.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// First message on every link; introduces the sender.
    Identity(IdentityInfo),
    /// A batch of versioned operations.
    Changes(Vec<VersionedOp>),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::Identity(_) => 1,
            SyncMessage::Changes(_) => 2,
        }
    }

    /// Encodes the message.
    pub fn encode(&self) -> CodecResult<Bytes> {
        let mut writer = WireWriter::new();
        writer.put_u8(self.type_code());
        match self {
            SyncMessage::Identity(info) => info.encode_to(&mut writer)?,
            SyncMessage::Changes(ops) => {
                writer.put_len(ops.len())?;
                for versioned in ops {
                    writer.put_u32(versioned.state.ops_sent);
                    writer.put_u32(versioned.state.ops_received);
                    versioned.op.encode_to(&mut writer)?;
                }
            }
        }
        Ok(writer.into_bytes())
    }

    /// Decodes a message using the built-in operation factory.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Self::decode_with(OperationFactory::builtin(), bytes)
    }

    /// Decodes a message, building operations with `factory`.
    pub fn decode_with(factory: &OperationFactory, bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = WireReader::new(bytes);
        let tag = reader.read_u8()?;
        let message = match tag {
            1 => SyncMessage::Identity(IdentityInfo::decode_from(&mut reader)?),
            2 => {
                let count = reader.read_len()?;
                let mut ops = Vec::with_capacity(reader.capacity_for(count, 8 + MIN_OPERATION_SIZE));
                for _ in 0..count {
                    let state = OperationalState::new(reader.read_u32()?, reader.read_u32()?);
                    let op = factory.decode_from(&mut reader)?;
                    ops.push(VersionedOp::new(state, op));
                }
                SyncMessage::Changes(ops)
            }
            other => return Err(CodecError::unknown_tag("message type", other).into()),
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Identity a peer announces when a link opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityInfo {
    /// Message format version.
    pub protocol_version: u16,
    /// Sender authority.
    pub authority: AuthorityLevel,
    /// Sender system id.
    pub system_id: SystemId,
    /// Id of the user on the sending peer.
    pub user_id: UserId,
    /// Display name of that user.
    pub user_name: String,
}

impl IdentityInfo {
    /// Creates an identity for the current protocol version.
    pub fn new(
        authority: AuthorityLevel,
        system_id: SystemId,
        user_id: UserId,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            authority,
            system_id,
            user_id,
            user_name: user_name.into(),
        }
    }

    /// The sender's rank.
    pub fn rank(&self) -> PeerRank {
        PeerRank::new(self.authority, self.system_id)
    }

    fn encode_to(&self, writer: &mut WireWriter) -> CodecResult<()> {
        writer.put_u16(self.protocol_version);
        writer.put_u8(self.authority.to_code());
        writer.put_u32(self.system_id.as_u32());
        writer.put_u32(self.user_id.0);
        writer.put_str(&self.user_name)
    }

    fn decode_from(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let protocol_version = reader.read_u16()?;
        let code = reader.read_u8()?;
        let authority =
            AuthorityLevel::from_code(code).ok_or(CodecError::unknown_tag("authority", code))?;
        let system_id = SystemId::new(reader.read_u32()?)
            .ok_or_else(|| CodecError::invalid_structure("system id must be non-zero"))?;
        let user_id = UserId(reader.read_u32()?);
        let user_name = reader.read_str()?;
        Ok(Self {
            protocol_version,
            authority,
            system_id,
            user_id,
            user_name,
        })
    }
}
