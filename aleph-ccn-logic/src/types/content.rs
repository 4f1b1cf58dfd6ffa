use super::{ItemHash, ItemType, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed view of a message payload. User-defined fields stay opaque JSON;
/// only what the handlers need is lifted into struct fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Aggregate(AggregateContent),
    Post(PostContent),
    Store(StoreContent),
    Forget(ForgetContent),
    Program(ProgramContent),
}

impl MessageContent {
    pub fn parse(message_type: MessageType, raw: &str) -> Result<Self, serde_json::Error> {
        Ok(match message_type {
            MessageType::Aggregate => MessageContent::Aggregate(serde_json::from_str(raw)?),
            MessageType::Post => MessageContent::Post(serde_json::from_str(raw)?),
            MessageType::Store => MessageContent::Store(serde_json::from_str(raw)?),
            MessageType::Forget => MessageContent::Forget(serde_json::from_str(raw)?),
            MessageType::Program => MessageContent::Program(serde_json::from_str(raw)?),
        })
    }

    /// The address the message acts on behalf of. May differ from the
    /// envelope sender; that case goes through delegation authorization.
    pub fn address(&self) -> &str {
        match self {
            MessageContent::Aggregate(c) => &c.address,
            MessageContent::Post(c) => &c.address,
            MessageContent::Store(c) => &c.address,
            MessageContent::Forget(c) => &c.address,
            MessageContent::Program(c) => &c.address,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            MessageContent::Aggregate(c) => c.time,
            MessageContent::Post(c) => c.time,
            MessageContent::Store(c) => c.time,
            MessageContent::Forget(c) => c.time,
            MessageContent::Program(c) => c.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateContent {
    pub address: String,
    pub key: String,
    pub time: f64,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub address: String,
    #[serde(rename = "type")]
    pub post_type: String,
    pub time: f64,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub amends: Option<String>,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreContent {
    pub address: String,
    pub time: f64,
    pub item_type: ItemType,
    pub item_hash: ItemHash,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Temporary uploads get the short unpin grace period.
    #[serde(default)]
    pub temporary: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgetContent {
    pub address: String,
    pub time: f64,
    #[serde(default)]
    pub hashes: Vec<ItemHash>,
    #[serde(default)]
    pub aggregates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramTriggers {
    #[serde(default)]
    pub http: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramContent {
    pub address: String,
    pub time: f64,
    #[serde(default)]
    pub on: ProgramTriggers,
    #[serde(flatten)]
    pub descriptor: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_aggregate() {
        let raw = json!({
            "address": "0xA",
            "key": "profile",
            "time": 100.0,
            "content": {"name": "x"}
        });
        let content = MessageContent::parse(MessageType::Aggregate, &raw.to_string()).unwrap();
        assert_eq!(content.address(), "0xA");
        match content {
            MessageContent::Aggregate(c) => assert_eq!(c.content["name"], "x"),
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn post_ref_maps_to_amends() {
        let raw = json!({
            "address": "0xA",
            "type": "blog",
            "time": 20.0,
            "ref": "0".repeat(64),
            "content": "B"
        });
        let content = MessageContent::parse(MessageType::Post, &raw.to_string()).unwrap();
        match content {
            MessageContent::Post(c) => assert_eq!(c.amends.as_deref(), Some("0".repeat(64)).as_deref()),
            other => panic!("expected post, got {other:?}"),
        }
    }

    #[test]
    fn store_keeps_unknown_fields() {
        let raw = json!({
            "address": "0xA",
            "time": 100.0,
            "item_type": "ipfs",
            "item_hash": "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH",
            "mime_type": "image/png"
        });
        let content = MessageContent::parse(MessageType::Store, &raw.to_string()).unwrap();
        match content {
            MessageContent::Store(c) => {
                assert!(!c.temporary);
                assert_eq!(c.extra["mime_type"], "image/png");
            }
            other => panic!("expected store, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(MessageContent::parse(MessageType::Forget, r#"{"address": 3}"#).is_err());
        assert!(MessageContent::parse(MessageType::Store, r#"{"address": "0xA"}"#).is_err());
    }
}
