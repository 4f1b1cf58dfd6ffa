use crate::{
    chains::{decode_sync_payload, SyncBatch},
    pipeline::error::{backoff, PipelineError, RejectCode},
    repository::{pending_messages, pending_txs},
    settings::PendingTxSettings,
    storage::Storage,
    types::{Confirmation, ItemHash, MessageEnvelope, Origin, TxProtocol},
};
use aleph_ccn_entity::pending_txs::Model as PendingTx;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::{str::FromStr, sync::Arc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Unpacks claimed chain transactions into pending messages, each
/// stamped with its on-chain confirmation.
pub struct TxProcessor {
    db: DatabaseConnection,
    storage: Arc<Storage>,
    settings: PendingTxSettings,
    fetch_timeout: std::time::Duration,
    high_watermark: u64,
}

impl TxProcessor {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<Storage>,
        settings: PendingTxSettings,
        fetch_timeout: std::time::Duration,
        high_watermark: u64,
    ) -> Self {
        Self {
            db,
            storage,
            settings,
            fetch_timeout,
            high_watermark,
        }
    }

    #[instrument(name = "tx_processor", skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(self.settings.poll_interval) => {}
            }

            // chain data is never dropped, but unpacking slows down while
            // the message queue is saturated
            match pending_messages::count(&self.db).await {
                Ok(count) if count > self.high_watermark => {
                    tracing::debug!(count, "message queue over high watermark, deferring claims");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "failed to read queue depth");
                    continue;
                }
                Ok(_) => {}
            }

            let batch = match pending_txs::claim_batch(
                &self.db,
                self.settings.batch_size,
                self.settings.claim_timeout,
            )
            .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(error = ?err, "failed to claim pending txs");
                    continue;
                }
            };

            for tx in batch {
                self.process_tx(tx).await;
            }
        }
    }

    async fn process_tx(&self, tx: PendingTx) {
        match self.unpack(&tx).await {
            Ok(envelopes) => {
                if let Err(err) = self.fan_out(&tx, envelopes).await {
                    tracing::error!(
                        chain = tx.chain,
                        tx_hash = tx.tx_hash,
                        error = ?err,
                        "failed to fan out tx"
                    );
                }
            }
            Err(PipelineError::Permanent { reason, .. }) => {
                tracing::info!(chain = tx.chain, tx_hash = tx.tx_hash, reason, "rejecting tx");
                if let Err(err) = pending_txs::reject(&self.db, &tx, &reason).await {
                    tracing::error!(error = ?err, "failed to reject pending tx");
                }
            }
            Err(PipelineError::Transient(err)) => {
                let retries = tx.retries as u32 + 1;
                if retries >= self.settings.max_retries {
                    tracing::warn!(
                        chain = tx.chain,
                        tx_hash = tx.tx_hash,
                        retries,
                        "tx retries exhausted; error={err:#}"
                    );
                    if let Err(err) =
                        pending_txs::reject(&self.db, &tx, &format!("retries exhausted: {err:#}"))
                            .await
                    {
                        tracing::error!(error = ?err, "failed to reject pending tx");
                    }
                } else {
                    let delay = backoff(retries, self.settings.retry_base, self.settings.retry_cap);
                    if let Err(err) =
                        pending_txs::reschedule(&self.db, tx.id, retries, delay).await
                    {
                        tracing::error!(error = ?err, "failed to reschedule pending tx");
                    }
                }
            }
        }
    }

    async fn unpack(&self, tx: &PendingTx) -> Result<Vec<MessageEnvelope>, PipelineError> {
        let protocol = TxProtocol::from_str(&tx.protocol).map_err(|e| {
            PipelineError::permanent(RejectCode::InvalidFormat, format!("tx protocol: {e}"))
        })?;

        let batch = match protocol {
            TxProtocol::BatchInline => tx.content.clone().ok_or_else(|| {
                PipelineError::permanent(RejectCode::InvalidFormat, "inline tx without content")
            })?,
            TxProtocol::BatchRef => {
                let reference = tx.content_ref.as_deref().ok_or_else(|| {
                    PipelineError::permanent(RejectCode::InvalidFormat, "ref tx without content_ref")
                })?;
                let hash = ItemHash::from_str(reference).map_err(|e| {
                    PipelineError::permanent(RejectCode::InvalidFormat, format!("content ref: {e}"))
                })?;
                let bytes = self.storage.fetch(&hash, self.fetch_timeout).await?;
                let raw = String::from_utf8(bytes).map_err(|_| {
                    PipelineError::permanent(RejectCode::InvalidFormat, "payload is not utf-8")
                })?;
                match decode_sync_payload(&raw).map_err(|e| {
                    PipelineError::permanent(RejectCode::InvalidFormat, format!("payload: {e}"))
                })? {
                    SyncBatch::Inline(content) => content,
                    SyncBatch::Reference(_) => {
                        return Err(PipelineError::permanent(
                            RejectCode::InvalidFormat,
                            "off-chain payload references another payload",
                        ))
                    }
                }
            }
        };

        let items = batch.as_array().ok_or_else(|| {
            PipelineError::permanent(RejectCode::InvalidFormat, "payload content is not an array")
        })?;

        // one bad envelope does not poison the batch
        let mut envelopes = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<MessageEnvelope>(item.clone()) {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => tracing::warn!(
                    chain = tx.chain,
                    tx_hash = tx.tx_hash,
                    error = %err,
                    "skipping malformed envelope in tx batch"
                ),
            }
        }
        Ok(envelopes)
    }

    /// Inserts the messages and deletes the tx in one transaction, so a
    /// crash can only replay the whole tx, never half of it.
    async fn fan_out(
        &self,
        tx: &PendingTx,
        envelopes: Vec<MessageEnvelope>,
    ) -> Result<(), anyhow::Error> {
        let confirmation = Confirmation {
            chain: tx.chain.parse().map_err(anyhow::Error::msg)?,
            height: tx.height as u64,
            tx_hash: tx.tx_hash.clone(),
        };

        let txn = self.db.begin().await?;
        pending_messages::insert_many(
            &txn,
            &envelopes,
            Origin::Onchain,
            Some(&confirmation),
            true,
        )
        .await?;
        pending_txs::delete(&txn, tx.id).await?;
        txn.commit().await?;

        tracing::debug!(
            chain = tx.chain,
            tx_hash = tx.tx_hash,
            messages = envelopes.len(),
            "unpacked tx"
        );
        Ok(())
    }
}
