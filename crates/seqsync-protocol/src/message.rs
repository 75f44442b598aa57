//! Inbound operation messages

use crate::error::{ProtocolError, ProtocolResult};
use seqsync_core::{ElementId, Operation, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Maximum message size (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const INSERT: &str = "Insert";
const DELETE: &str = "Delete";

/// Raw operation as it appears on the wire.
///
/// Every field is optional at this level so that a missing field can be
/// reported by name instead of as a generic JSON error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
}

/// Timestamps are sent as decimal strings; bare JSON integers are accepted too
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Text(String),
    Number(u64),
}

impl WireTimestamp {
    fn parse(&self) -> ProtocolResult<Timestamp> {
        match self {
            WireTimestamp::Text(s) => Ok(s.parse()?),
            WireTimestamp::Number(n) => Ok(Timestamp(*n)),
        }
    }
}

impl TryFrom<WireMessage> for Operation {
    type Error = ProtocolError;

    fn try_from(msg: WireMessage) -> ProtocolResult<Self> {
        match msg.kind.as_str() {
            INSERT => {
                let after = msg.after.ok_or(ProtocolError::MissingField("after"))?;
                let id = msg.id.ok_or(ProtocolError::MissingField("id"))?;
                let value = msg.value.ok_or(ProtocolError::MissingField("value"))?;
                let timestamp = msg
                    .timestamp
                    .ok_or(ProtocolError::MissingField("timestamp"))?
                    .parse()?;

                Ok(Operation::Insert {
                    after: parse_id(&after)?,
                    id: parse_id(&id)?,
                    value,
                    timestamp,
                })
            }
            DELETE => {
                let id = msg.id.ok_or(ProtocolError::MissingField("id"))?;
                let timestamp = msg.timestamp.map(|t| t.parse()).transpose()?;

                Ok(Operation::Delete {
                    id: parse_id(&id)?,
                    timestamp,
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl From<&Operation> for WireMessage {
    fn from(op: &Operation) -> Self {
        match op {
            Operation::Insert { after, id, value, timestamp } => WireMessage {
                kind: INSERT.to_string(),
                after: Some(after.to_string()),
                id: Some(id.to_string()),
                value: Some(value.clone()),
                timestamp: Some(WireTimestamp::Text(timestamp.to_string())),
            },
            Operation::Delete { id, timestamp } => WireMessage {
                kind: DELETE.to_string(),
                id: Some(id.to_string()),
                timestamp: timestamp.map(|t| WireTimestamp::Text(t.to_string())),
                ..Default::default()
            },
        }
    }
}

fn parse_id(s: &str) -> ProtocolResult<ElementId> {
    s.parse::<ElementId>()
        .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid element id: {:?}", s)))
}

/// Parse one raw inbound message into an operation
pub fn parse_operation(data: &[u8]) -> ProtocolResult<Operation> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let msg: WireMessage = serde_json::from_slice(data)?;
    trace!(kind = %msg.kind, id = ?msg.id, "Parsed wire message");
    Operation::try_from(msg)
}

/// Encode an operation as a wire message (used by clients and peers)
pub fn encode_operation(op: &Operation) -> ProtocolResult<String> {
    Ok(serde_json::to_string(&WireMessage::from(op))?)
}
