use crate::{
    pipeline::error::PipelineError,
    repository::programs,
    types::content::ProgramContent,
};
use anyhow::Context;
use sea_orm::ConnectionTrait;

/// Persists the program descriptor indexed by its triggers. Execution
/// belongs to the program runtime, which only reads this table.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
    content: &ProgramContent,
) -> Result<(), PipelineError> {
    let descriptor =
        serde_json::to_value(content).context("program descriptor serialization")?;
    programs::insert(
        db,
        programs::NewProgram {
            item_hash: item_hash.to_string(),
            owner: content.address.clone(),
            http_trigger: content.on.http,
            cron_schedule: content.on.cron.clone(),
            message_filters: content.on.message.clone(),
            descriptor,
        },
    )
    .await?;
    Ok(())
}

pub async fn revert<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<(), PipelineError> {
    programs::delete(db, item_hash).await?;
    Ok(())
}
