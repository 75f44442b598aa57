//! Outbound document pushes

use crate::error::ProtocolResult;
use bytes::Bytes;
use seqsync_core::Document;

/// Full-document push sent to sessions.
///
/// The payload is encoded once per broadcast and shared by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPush {
    /// Hub-local sequence number, never sent on the wire
    pub version: u64,
    /// Number of visible elements in the payload
    pub len: usize,
    payload: Bytes,
}

impl DocumentPush {
    /// Encode `document` as the JSON array of `{id, value}` pairs
    pub fn encode(version: u64, document: &Document) -> ProtocolResult<Self> {
        let payload = serde_json::to_vec(document)?;
        Ok(Self {
            version,
            len: document.len(),
            payload: Bytes::from(payload),
        })
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as text, for text-frame transports
    pub fn as_str(&self) -> &str {
        // serde_json only ever produces UTF-8
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }

    /// Decode a pushed payload back into a document (used by clients)
    pub fn decode(payload: &[u8]) -> ProtocolResult<Document> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqsync_core::{ElementId, Replica, SiteId};

    #[test]
    fn test_encode_empty_document() {
        let push = DocumentPush::encode(0, &Document::default()).unwrap();
        assert_eq!(push.as_str(), "[]");
        assert_eq!(push.len, 0);
    }

    #[test]
    fn test_encode_document() {
        let mut replica = Replica::new(SiteId::new("hub").unwrap());
        let h = replica.local_insert(ElementId::Head, "H").unwrap();
        replica.local_insert(h.id().clone(), "i").unwrap();

        let push = DocumentPush::encode(3, &replica.document()).unwrap();
        assert_eq!(
            push.as_str(),
            r#"[{"id":"hub:1","value":"H"},{"id":"hub:2","value":"i"}]"#
        );
        assert_eq!(push.version, 3);
        assert_eq!(DocumentPush::decode(push.payload()).unwrap(), replica.document());
    }
}
