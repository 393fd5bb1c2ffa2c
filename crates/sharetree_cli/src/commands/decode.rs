//! Decode command implementation.

use super::CliResult;
use serde::Serialize;
use sharetree_codec::TypedValue;
use sharetree_protocol::{IdentityInfo, OpBody, Operation, SyncMessage};

/// Operation representation for output.
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    /// Operation type name.
    pub op_type: String,
    /// Target element id.
    pub target: String,
    /// Authority of the sender.
    pub authority: String,
    /// Parent chain, nearest first.
    pub ancestors: Vec<String>,
    /// Sender's sent count (messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops_sent: Option<u32>,
    /// Sender's received count (messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops_received: Option<u32>,
    /// Array index, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Carried value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TypedValue>,
    /// Name of the created element, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// One-line rendering.
    pub summary: String,
}

impl OperationInfo {
    fn new(op: &Operation) -> Self {
        let name = match &op.body {
            OpBody::Create(seed) | OpBody::Replace { seed, .. } => Some(seed.name.clone()),
            _ => None,
        };
        Self {
            op_type: op.op_type().name().to_string(),
            target: op.target.to_string(),
            authority: op.authority.to_string(),
            ancestors: op.ancestors.iter().map(ToString::to_string).collect(),
            ops_sent: None,
            ops_received: None,
            index: op.index(),
            value: op.value().cloned(),
            name,
            summary: op.to_string(),
        }
    }
}

/// Decoded peer message for output.
#[derive(Debug, Serialize)]
#[serde(tag = "message", rename_all = "lowercase")]
pub enum MessageInfo {
    /// Identity handshake.
    Identity {
        /// Protocol version.
        protocol_version: u16,
        /// Authority level.
        authority: String,
        /// System id.
        system_id: u32,
        /// User id.
        user_id: u32,
        /// User name.
        user_name: String,
    },
    /// Operation batch.
    Changes {
        /// Operations in order.
        operations: Vec<OperationInfo>,
    },
}

impl MessageInfo {
    fn new(message: &SyncMessage) -> Self {
        match message {
            SyncMessage::Identity(info) => identity(info),
            SyncMessage::Changes(ops) => MessageInfo::Changes {
                operations: ops
                    .iter()
                    .map(|versioned| OperationInfo {
                        ops_sent: Some(versioned.state.ops_sent),
                        ops_received: Some(versioned.state.ops_received),
                        ..OperationInfo::new(&versioned.op)
                    })
                    .collect(),
            },
        }
    }
}

fn identity(info: &IdentityInfo) -> MessageInfo {
    MessageInfo::Identity {
        protocol_version: info.protocol_version,
        authority: info.authority.to_string(),
        system_id: info.system_id.as_u32(),
        user_id: info.user_id.0,
        user_name: info.user_name.clone(),
    }
}

/// Parses hex, ignoring whitespace.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

/// Runs the decode command.
pub fn run(input: &str, message: bool, format: &str) -> CliResult<()> {
    let bytes = parse_hex(input)?;
    if message {
        let info = MessageInfo::new(&SyncMessage::decode(&bytes)?);
        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&info)?),
            _ => print_message(&info),
        }
    } else {
        let info = OperationInfo::new(&Operation::decode(&bytes)?);
        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&info)?),
            _ => print_operation(&info),
        }
    }
    Ok(())
}

fn print_operation(info: &OperationInfo) {
    println!("{}", info.summary);
    println!("  type:      {}", info.op_type);
    println!("  authority: {}", info.authority);
    if info.ancestors.is_empty() {
        println!("  path:      (root)");
    } else {
        println!("  path:      {}", info.ancestors.join(" <- "));
    }
    if let (Some(sent), Some(received)) = (info.ops_sent, info.ops_received) {
        println!("  state:     sent={sent} received={received}");
    }
}

fn print_message(info: &MessageInfo) {
    match info {
        MessageInfo::Identity {
            protocol_version,
            authority,
            system_id,
            user_id,
            user_name,
        } => {
            println!("Identity v{protocol_version}");
            println!("  user:      {user_name} ({user_id})");
            println!("  system:    {system_id}");
            println!("  authority: {authority}");
        }
        MessageInfo::Changes { operations } => {
            println!("Changes ({} operations)", operations.len());
            for op in operations {
                print_operation(op);
            }
        }
    }
}
