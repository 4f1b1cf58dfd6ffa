pub mod aggregate;
pub mod forget;
pub mod post;
pub mod program;
pub mod store;

use crate::{
    pipeline::error::PipelineError,
    storage::Storage,
    types::{MessageContent, MessageEnvelope, MessageType},
};
use aleph_ccn_entity::messages;
use sea_orm::ConnectionTrait;
use std::{str::FromStr, time::Duration};

/// What a handler may reach besides the open transaction.
pub struct HandlerContext<'a> {
    pub storage: &'a Storage,
    pub fetch_timeout: Duration,
    pub temp_grace: Duration,
    pub normal_grace: Duration,
}

/// Applies the message's effect on the derived tables, inside the
/// caller's transaction.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    ctx: &HandlerContext<'_>,
    envelope: &MessageEnvelope,
    content: &MessageContent,
) -> Result<(), PipelineError> {
    let item_hash = envelope.item_hash.as_str();
    match content {
        MessageContent::Aggregate(c) => aggregate::apply(db, item_hash, c).await,
        MessageContent::Post(c) => post::apply(db, envelope, c).await,
        MessageContent::Store(c) => store::apply(db, ctx, item_hash, c).await,
        MessageContent::Forget(c) => {
            forget::apply(db, ctx, item_hash, &envelope.sender, c).await
        }
        MessageContent::Program(c) => program::apply(db, item_hash, c).await,
    }
}

/// The reverse effect, used by FORGET. Dispatches on the stored message
/// type alone so even a tombstoned row could be reverted again safely.
pub async fn revert_message<C: ConnectionTrait>(
    db: &C,
    ctx: &HandlerContext<'_>,
    target: &messages::Model,
) -> Result<(), PipelineError> {
    let message_type = MessageType::from_str(&target.message_type)
        .map_err(|e| PipelineError::Transient(anyhow::anyhow!(e)))?;
    match message_type {
        MessageType::Aggregate => aggregate::revert(db, &target.item_hash).await,
        MessageType::Post => post::revert(db, &target.item_hash).await,
        MessageType::Store => store::revert(db, ctx, &target.item_hash).await,
        MessageType::Program => program::revert(db, &target.item_hash).await,
        // FORGET targets are filtered out before this is reached
        MessageType::Forget => Ok(()),
    }
}
