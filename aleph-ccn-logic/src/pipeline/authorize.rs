use crate::{
    repository::aggregates,
    types::{MessageContent, MessageEnvelope, MessageType},
};
use sea_orm::{ConnectionTrait, DbErr};
use serde::Deserialize;

/// The aggregate key holding an address's delegation list.
pub const SECURITY_KEY: &str = "security";

#[derive(Debug, Default, Deserialize)]
struct SecurityAggregate {
    #[serde(default)]
    authorizations: Vec<Delegation>,
}

/// One delegation entry. Unset filters are wildcards.
#[derive(Debug, Deserialize)]
struct Delegation {
    address: String,
    #[serde(default)]
    chain: Option<String>,
    #[serde(default)]
    channels: Option<Vec<String>>,
    #[serde(default)]
    types: Option<Vec<MessageType>>,
    #[serde(default)]
    post_types: Option<Vec<String>>,
    #[serde(default)]
    aggregate_keys: Option<Vec<String>>,
}

/// Checks whether the envelope sender may act for `content.address()`.
/// Senders always act for themselves; anyone else needs a matching entry
/// in the address's security aggregate.
pub async fn check<C: ConnectionTrait>(
    db: &C,
    envelope: &MessageEnvelope,
    content: &MessageContent,
) -> Result<bool, DbErr> {
    let address = content.address();
    if envelope.sender == address {
        return Ok(true);
    }

    // the security aggregate itself can never be delegated
    if let MessageContent::Aggregate(aggregate) = content {
        if aggregate.key == SECURITY_KEY {
            return Ok(false);
        }
    }

    let Some(view) = aggregates::get_view(db, address, SECURITY_KEY).await? else {
        return Ok(false);
    };
    let security: SecurityAggregate = match serde_json::from_value(view.content) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(address, error = %err, "unparseable security aggregate");
            return Ok(false);
        }
    };

    Ok(security
        .authorizations
        .iter()
        .any(|delegation| allows(delegation, envelope, content)))
}

fn allows(delegation: &Delegation, envelope: &MessageEnvelope, content: &MessageContent) -> bool {
    if delegation.address != envelope.sender {
        return false;
    }
    if let Some(chain) = &delegation.chain {
        if chain != envelope.chain.as_str() {
            return false;
        }
    }
    if let Some(channels) = &delegation.channels {
        match &envelope.channel {
            Some(channel) if channels.contains(channel) => {}
            _ => return false,
        }
    }
    if let Some(types) = &delegation.types {
        if !types.contains(&envelope.message_type) {
            return false;
        }
    }
    match content {
        MessageContent::Post(post) => match &delegation.post_types {
            Some(post_types) if !post_types.contains(&post.post_type) => false,
            _ => true,
        },
        MessageContent::Aggregate(aggregate) => match &delegation.aggregate_keys {
            Some(keys) if !keys.contains(&aggregate.key) => false,
            _ => true,
        },
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sha256_hex, Chain, ItemType};
    use serde_json::json;

    fn envelope(sender: &str, message_type: MessageType) -> MessageEnvelope {
        MessageEnvelope {
            chain: Chain::Eth,
            sender: sender.to_string(),
            message_type,
            channel: Some("TEST".to_string()),
            time: 1.0,
            item_type: ItemType::Inline,
            item_hash: sha256_hex(b"x").parse().unwrap(),
            item_content: None,
            signature: None,
        }
    }

    fn delegation(value: serde_json::Value) -> Delegation {
        serde_json::from_value(value).unwrap()
    }

    fn post_content(address: &str, post_type: &str) -> MessageContent {
        MessageContent::Post(
            serde_json::from_value(json!({
                "address": address,
                "type": post_type,
                "time": 1.0,
                "content": {}
            }))
            .unwrap(),
        )
    }

    #[test]
    fn unspecified_filters_are_wildcards() {
        let delegation = delegation(json!({"address": "0xB"}));
        assert!(allows(
            &delegation,
            &envelope("0xB", MessageType::Post),
            &post_content("0xA", "blog"),
        ));
    }

    #[test]
    fn wrong_sender_never_matches() {
        let delegation = delegation(json!({"address": "0xB"}));
        assert!(!allows(
            &delegation,
            &envelope("0xC", MessageType::Post),
            &post_content("0xA", "blog"),
        ));
    }

    #[test]
    fn type_and_post_type_filters_apply() {
        let delegation = delegation(json!({
            "address": "0xB",
            "types": ["POST"],
            "post_types": ["blog"]
        }));
        assert!(allows(
            &delegation,
            &envelope("0xB", MessageType::Post),
            &post_content("0xA", "blog"),
        ));
        assert!(!allows(
            &delegation,
            &envelope("0xB", MessageType::Post),
            &post_content("0xA", "comment"),
        ));
        assert!(!allows(
            &delegation,
            &envelope("0xB", MessageType::Forget),
            &post_content("0xA", "blog"),
        ));
    }

    #[test]
    fn channel_filter_requires_a_channel() {
        let delegation = delegation(json!({"address": "0xB", "channels": ["OTHER"]}));
        assert!(!allows(
            &delegation,
            &envelope("0xB", MessageType::Post),
            &post_content("0xA", "blog"),
        ));
    }
}
