use super::Storage;
use crate::{repository::stored_files, settings::StorageSettings, types::ItemHash};
use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::{str::FromStr, sync::Arc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Hourly sweep of files whose scheduled deletion is due.
#[instrument(name = "storage_gc", skip_all)]
pub async fn run(
    db: DatabaseConnection,
    storage: Arc<Storage>,
    settings: StorageSettings,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(settings.gc_interval) => {}
        }

        match collect(&db, &storage).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "garbage collected files"),
            Err(err) => tracing::warn!(error = ?err, "gc sweep failed"),
        }
    }
}

/// One sweep. Both deletion conditions are re-checked under the file
/// row lock so a concurrent STORE that re-pinned the file wins; the
/// object itself is removed after commit (idempotent, a crash leaves at
/// worst an orphan object).
pub async fn collect(db: &DatabaseConnection, storage: &Storage) -> anyhow::Result<u64> {
    let mut removed = 0;
    for candidate in stored_files::gc_candidates(db).await? {
        let txn = db.begin().await?;
        let Some(current) = stored_files::lock(&txn, &candidate.file_hash).await? else {
            continue;
        };
        let due = current.pin_count == 0
            && current
                .pin_delete_at
                .map_or(false, |at| at <= Utc::now());
        if !due {
            continue;
        }

        stored_files::delete_pins_for_file(&txn, &current.file_hash).await?;
        stored_files::delete(&txn, &current.file_hash).await?;
        txn.commit().await?;

        match ItemHash::from_str(&current.file_hash) {
            Ok(hash) => {
                if let Err(err) = storage.remove(&hash).await {
                    tracing::warn!(
                        file_hash = current.file_hash,
                        error = ?err,
                        "failed to remove object, leaving orphan"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(file_hash = current.file_hash, error = %err, "unparseable file hash");
            }
        }
        removed += 1;
        tracing::debug!(file_hash = current.file_hash, "deleted expired file");
    }
    Ok(removed)
}
