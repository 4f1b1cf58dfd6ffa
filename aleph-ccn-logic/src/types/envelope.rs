use super::{cid_v0, sha256_hex, Chain, ItemHash, ItemType, MessageType};
use serde::{Deserialize, Serialize};

/// Inline payloads above this size are rejected outright.
pub const MAX_INLINE_CONTENT_SIZE: usize = 200 * 1024;

/// The wire format shared by all three ingestion sources.
///
/// `item_content` is only present for inline messages; everything else is
/// fetched by `item_hash` from the object store or IPFS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub chain: Chain,
    pub sender: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub channel: Option<String>,
    pub time: f64,
    pub item_type: ItemType,
    pub item_hash: ItemHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MessageEnvelope {
    /// The byte string the sender signed: the canonical JSON encoding of
    /// `{chain, item_hash, sender, type}` with sorted keys and no
    /// whitespace. Built by hand so the encoding cannot drift with
    /// serializer settings.
    pub fn verification_buffer(&self) -> Vec<u8> {
        format!(
            r#"{{"chain":"{}","item_hash":"{}","sender":"{}","type":"{}"}}"#,
            self.chain, self.item_hash, self.sender, self.message_type
        )
        .into_bytes()
    }

    /// Checks that `content` is the bytes `item_hash` commits to.
    pub fn matches_item_hash(&self, content: &[u8]) -> bool {
        match self.item_type {
            ItemType::Inline | ItemType::Storage => sha256_hex(content) == self.item_hash.as_str(),
            ItemType::Ipfs => cid_v0(content) == self.item_hash.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(content: &str) -> MessageEnvelope {
        MessageEnvelope {
            chain: Chain::Eth,
            sender: "0xB68B9D4f3771c246233823ed1D3Add451055F9Ef".to_string(),
            message_type: MessageType::Post,
            channel: Some("TEST".to_string()),
            time: 1672531200.0,
            item_type: ItemType::Inline,
            item_hash: sha256_hex(content.as_bytes()).parse().unwrap(),
            item_content: Some(content.to_string()),
            signature: None,
        }
    }

    #[test]
    fn verification_buffer_is_sorted_and_compact() {
        let env = envelope(r#"{"type":"test","content":{}}"#);
        let buffer = String::from_utf8(env.verification_buffer()).unwrap();
        assert_eq!(
            buffer,
            format!(
                r#"{{"chain":"ETH","item_hash":"{}","sender":"0xB68B9D4f3771c246233823ed1D3Add451055F9Ef","type":"POST"}}"#,
                env.item_hash
            )
        );
    }

    #[test]
    fn inline_hash_binding() {
        let env = envelope("payload");
        assert!(env.matches_item_hash(b"payload"));
        assert!(!env.matches_item_hash(b"tampered"));
    }

    #[test]
    fn wire_round_trip_keeps_type_field_name() {
        let env = envelope("x");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "POST");
        assert_eq!(json["item_type"], "inline");
        let back: MessageEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }
}
