use super::HandlerContext;
use crate::{
    pipeline::error::{PipelineError, RejectCode},
    repository::stored_files::{self, pins},
    types::{content::StoreContent, ItemType},
};
use anyhow::anyhow;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::ConnectionTrait;

/// Applies a STORE: make the file available (fetch + pin), then account
/// for the pin under the file's row lock.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    ctx: &HandlerContext<'_>,
    owner_item_hash: &str,
    content: &StoreContent,
) -> Result<(), PipelineError> {
    let file_hash = &content.item_hash;
    let storage_kind = match content.item_type {
        ItemType::Storage => "local",
        ItemType::Ipfs => "ipfs",
        ItemType::Inline => {
            return Err(PipelineError::permanent(
                RejectCode::InvalidContent,
                "STORE cannot reference inline content",
            ))
        }
    };

    // Fetching makes the node a replica and is how we learn the size.
    let bytes = ctx.storage.fetch(file_hash, ctx.fetch_timeout).await?;
    ctx.storage.pin(file_hash).await?;

    stored_files::insert(db, file_hash.as_str(), storage_kind, bytes.len() as u64).await?;
    let file = stored_files::lock(db, file_hash.as_str())
        .await?
        .ok_or_else(|| anyhow!("stored file row vanished under lock"))?;

    let added = pins::add(
        db,
        owner_item_hash,
        file_hash.as_str(),
        &content.address,
        bytes.len() as u64,
        content.temporary,
    )
    .await?;
    if added {
        // any increment cancels a scheduled deletion
        stored_files::set_pin_state(db, file_hash.as_str(), file.pin_count + 1, None).await?;
    }
    Ok(())
}

/// FORGET reverse effect: drop this message's pin; the last pin out
/// schedules deletion after the grace period.
pub async fn revert<C: ConnectionTrait>(
    db: &C,
    ctx: &HandlerContext<'_>,
    owner_item_hash: &str,
) -> Result<(), PipelineError> {
    let Some(pin) = pins::remove(db, owner_item_hash).await? else {
        return Ok(());
    };
    let Some(file) = stored_files::lock(db, &pin.file_hash).await? else {
        return Ok(());
    };

    let pin_count = (file.pin_count - 1).max(0);
    let pin_delete_at = if pin_count == 0 {
        let grace = if pin.temporary {
            ctx.temp_grace
        } else {
            ctx.normal_grace
        };
        Some(
            Utc::now()
                + ChronoDuration::from_std(grace).unwrap_or_else(|_| ChronoDuration::hours(24)),
        )
    } else {
        file.pin_delete_at
    };
    stored_files::set_pin_state(db, &pin.file_hash, pin_count, pin_delete_at).await?;
    Ok(())
}
