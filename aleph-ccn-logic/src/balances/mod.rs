use crate::{
    repository::{balances, stored_files},
    settings::BalancesSettings,
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Periodically compares each address's pinned bytes against the storage
/// allowance bought by its balance, and releases the address's pins on
/// least-recently-accessed files until usage fits. A file whose last pin
/// goes away this way is scheduled for deletion; deletion itself is the
/// GC's job.
pub struct Reconciler {
    db: DatabaseConnection,
    settings: BalancesSettings,
}

impl Reconciler {
    pub fn new(db: DatabaseConnection, settings: BalancesSettings) -> Self {
        Self { db, settings }
    }

    #[instrument(name = "balance_reconciler", skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(self.settings.interval) => {}
            }

            match self.reconcile().await {
                Ok(0) => {}
                Ok(flagged) => tracing::info!(flagged, "flagged over-quota files for deletion"),
                Err(err) => tracing::warn!(error = ?err, "balance reconciliation failed"),
            }
        }
    }

    async fn reconcile(&self) -> anyhow::Result<u64> {
        let mut flagged = 0;
        for (address, used) in stored_files::pins::usage_by_address(&self.db).await? {
            let balance = balances::total_for_address(&self.db, &address).await?;
            let allowance = (balance.max(0.0) * self.settings.bytes_per_token as f64) as i64;
            if used <= allowance {
                continue;
            }

            tracing::debug!(address, used, allowance, "address over storage allowance");
            let delete_at = Utc::now() + ChronoDuration::hours(24);
            let mut excess = used - allowance;
            for file in stored_files::lru_for_address(&self.db, &address).await? {
                if excess <= 0 {
                    break;
                }
                // release this address's pins under the row lock; other
                // addresses' pins on the same content keep the file alive
                let txn = self.db.begin().await?;
                let Some(current) = stored_files::lock(&txn, &file.file_hash).await? else {
                    continue;
                };
                let released =
                    stored_files::pins::remove_for_address(&txn, &file.file_hash, &address)
                        .await?;
                if released.is_empty() {
                    continue;
                }
                let pin_count = (current.pin_count - released.len() as i32).max(0);
                let pin_delete_at = if pin_count == 0 {
                    Some(delete_at)
                } else {
                    current.pin_delete_at
                };
                stored_files::set_pin_state(&txn, &file.file_hash, pin_count, pin_delete_at)
                    .await?;
                txn.commit().await?;

                excess -= released.iter().map(|pin| pin.size).sum::<i64>();
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}
