use super::HandlerContext;
use crate::{
    pipeline::error::PipelineError,
    repository::{aggregates, messages},
    types::{content::ForgetContent, MessageType},
};
use sea_orm::ConnectionTrait;

/// Tombstones each target and reverses its side effects. Conflicts
/// (unknown target, already forgotten, FORGET target) are silent
/// successes so re-deliveries converge.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    ctx: &HandlerContext<'_>,
    forget_hash: &str,
    sender: &str,
    content: &ForgetContent,
) -> Result<(), PipelineError> {
    for target_hash in &content.hashes {
        let Some(target) = messages::get(db, target_hash.as_str()).await? else {
            tracing::debug!(forget_hash, target = %target_hash, "FORGET target does not exist");
            continue;
        };
        if target.message_type == MessageType::Forget.as_str() {
            tracing::debug!(forget_hash, target = %target_hash, "FORGET is not forgettable");
            continue;
        }
        if target.forgotten_by.is_some() {
            continue;
        }
        // The authorize stage has cleared the sender for
        // `content.address`; a delegate may only reach messages of the
        // address that delegated.
        if target.sender != sender && target.sender != content.address {
            tracing::warn!(
                forget_hash,
                target = %target_hash,
                target_sender = target.sender,
                "FORGET target belongs to another sender, skipping"
            );
            continue;
        }

        super::revert_message(db, ctx, &target).await?;
        messages::tombstone(db, target_hash.as_str(), forget_hash).await?;
    }

    for key in &content.aggregates {
        aggregates::delete_elements(db, &content.address, key).await?;
        aggregates::delete_view(db, &content.address, key).await?;
    }
    Ok(())
}
