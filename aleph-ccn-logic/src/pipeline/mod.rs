pub mod authorize;
pub mod error;

use crate::{
    handlers,
    metrics,
    p2p::Publisher,
    repository::{messages, pending_messages},
    settings::{PipelineSettings, StorageSettings},
    signature,
    storage::Storage,
    types::{
        envelope::MAX_INLINE_CONTENT_SIZE, Confirmation, ItemType, MessageContent,
        MessageEnvelope, MessageType, Origin,
    },
};
use aleph_ccn_entity::pending_messages::Model as PendingMessage;
use error::{backoff, PipelineError, RejectCode};
use futures::{stream, StreamExt};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Typed view of a claimed pending row. Parsing failures here mean the
/// row can never be processed and reject it immediately.
pub struct MessageRecord {
    pub row_id: i64,
    pub retries: u32,
    pub origin: Origin,
    pub confirmation: Option<Confirmation>,
    pub check_message: bool,
    pub envelope: MessageEnvelope,
}

impl TryFrom<&PendingMessage> for MessageRecord {
    type Error = String;

    fn try_from(row: &PendingMessage) -> Result<Self, Self::Error> {
        let confirmation = match (&row.conf_chain, row.conf_height, &row.conf_tx_hash) {
            (Some(chain), Some(height), Some(tx_hash)) => Some(Confirmation {
                chain: chain.parse()?,
                height: height as u64,
                tx_hash: tx_hash.clone(),
            }),
            (None, None, None) => None,
            _ => return Err("partial confirmation columns".to_string()),
        };
        Ok(MessageRecord {
            row_id: row.id,
            retries: row.retries as u32,
            origin: row.origin.parse()?,
            confirmation,
            check_message: row.check_message,
            envelope: MessageEnvelope {
                chain: row.chain.parse()?,
                sender: row.sender.clone(),
                message_type: row.message_type.parse()?,
                channel: row.channel.clone(),
                time: row.time,
                item_type: row.item_type.parse()?,
                item_hash: row.item_hash.parse()?,
                item_content: row.item_content.clone(),
                signature: row.signature.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// First confirmation of this hash; side effects were applied.
    Applied,
    /// The hash was already confirmed; only confirmations were merged.
    Deduplicated,
}

/// The pending-message state machine. One worker group per message type,
/// each claiming its own batches, so heavy types cannot starve light
/// ones.
pub struct MessagePipeline {
    db: DatabaseConnection,
    storage: Arc<Storage>,
    publisher: Option<Arc<Publisher>>,
    settings: PipelineSettings,
    storage_settings: StorageSettings,
}

impl MessagePipeline {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<Storage>,
        publisher: Option<Arc<Publisher>>,
        settings: PipelineSettings,
        storage_settings: StorageSettings,
    ) -> Self {
        Self {
            db,
            storage,
            publisher,
            settings,
            storage_settings,
        }
    }

    #[instrument(name = "message_pipeline", skip_all)]
    pub async fn start(&self, shutdown: CancellationToken) {
        let groups = MessageType::ALL.map(|message_type| {
            let workers = self.workers_for(message_type);
            self.run_group(message_type, workers, shutdown.clone())
        });
        futures::future::join_all(groups).await;
    }

    fn workers_for(&self, message_type: MessageType) -> u32 {
        let concurrency = &self.settings.concurrency;
        match message_type {
            MessageType::Aggregate => concurrency.aggregate,
            MessageType::Post => concurrency.post,
            MessageType::Store => concurrency.store,
            MessageType::Forget => concurrency.forget,
            MessageType::Program => concurrency.program,
        }
    }

    async fn run_group(
        &self,
        message_type: MessageType,
        workers: u32,
        shutdown: CancellationToken,
    ) {
        if workers == 0 {
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(self.settings.poll_interval) => {}
            }

            let batch = match pending_messages::claim_batch(
                &self.db,
                message_type,
                self.settings.batch_size,
                self.settings.claim_timeout,
            )
            .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(%message_type, error = ?err, "failed to claim pending messages");
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            // in-flight rows are finished even when shutdown fires; the
            // select above stops new claims
            stream::iter(batch)
                .for_each_concurrent(workers as usize, |row| async move {
                    self.process_row(row).await;
                })
                .await;
        }
    }

    pub(crate) async fn process_row(&self, row: PendingMessage) {
        let outcome_label = match MessageRecord::try_from(&row) {
            Err(reason) => {
                tracing::warn!(item_hash = row.item_hash, reason, "unparseable pending message");
                if let Err(err) =
                    pending_messages::reject(&self.db, &row, RejectCode::InvalidFormat.as_str(), &reason)
                        .await
                {
                    tracing::error!(error = ?err, "failed to reject pending message");
                }
                "rejected"
            }
            Ok(record) => match self.process(&record).await {
                Ok(outcome) => {
                    if let Err(err) = pending_messages::delete(&self.db, record.row_id).await {
                        tracing::error!(error = ?err, "failed to retire pending message");
                    }
                    self.maybe_publish(&record, outcome).await;
                    match outcome {
                        Processed::Applied => "applied",
                        Processed::Deduplicated => "deduplicated",
                    }
                }
                Err(PipelineError::Permanent { code, reason }) => {
                    tracing::info!(
                        item_hash = row.item_hash,
                        code = code.as_str(),
                        reason,
                        "rejecting message"
                    );
                    if let Err(err) =
                        pending_messages::reject(&self.db, &row, code.as_str(), &reason).await
                    {
                        tracing::error!(error = ?err, "failed to reject pending message");
                    }
                    "rejected"
                }
                Err(PipelineError::Transient(err)) => {
                    let retries = record.retries + 1;
                    if retries >= self.settings.max_retries {
                        tracing::warn!(
                            item_hash = row.item_hash,
                            retries,
                            "retries exhausted; rejecting; error={err:#}"
                        );
                        if let Err(err) = pending_messages::reject(
                            &self.db,
                            &row,
                            RejectCode::RetryExhausted.as_str(),
                            &format!("{err:#}"),
                        )
                        .await
                        {
                            tracing::error!(error = ?err, "failed to reject pending message");
                        }
                        "rejected"
                    } else {
                        let delay =
                            backoff(retries, self.settings.retry_base, self.settings.retry_cap);
                        tracing::debug!(
                            item_hash = row.item_hash,
                            retries,
                            ?delay,
                            "retrying later; error={err:#}"
                        );
                        if let Err(err) =
                            pending_messages::reschedule(&self.db, record.row_id, retries, delay)
                                .await
                        {
                            tracing::error!(error = ?err, "failed to reschedule pending message");
                        }
                        "retried"
                    }
                }
            },
        };
        metrics::MESSAGES_PROCESSED
            .with_label_values(&[row.message_type.as_str(), outcome_label])
            .inc();
    }

    /// FETCHING → VALIDATING → PROCESSING for a single record.
    async fn process(&self, record: &MessageRecord) -> Result<Processed, PipelineError> {
        let raw = self.fetch_content(record).await?;

        let content = MessageContent::parse(record.envelope.message_type, &raw).map_err(|e| {
            PipelineError::permanent(RejectCode::InvalidContent, format!("content schema: {e}"))
        })?;

        if record.check_message {
            signature::verify(&record.envelope).map_err(|e| {
                PipelineError::permanent(RejectCode::InvalidSignature, e.to_string())
            })?;
        }

        // dedup comes before authorization: a hash we already confirmed
        // only merges its confirmation, even if a delegation was revoked
        // between the two deliveries
        let item_hash = record.envelope.item_hash.as_str();
        if messages::exists(&self.db, item_hash).await? {
            if let Some(confirmation) = &record.confirmation {
                messages::add_confirmation(&self.db, item_hash, confirmation).await?;
            }
            return Ok(Processed::Deduplicated);
        }

        if !authorize::check(&self.db, &record.envelope, &content).await? {
            return Err(PipelineError::permanent(
                RejectCode::Unauthorized,
                format!(
                    "{} is not authorized to act for {}",
                    record.envelope.sender,
                    content.address()
                ),
            ));
        }

        self.commit(record, &content, &raw).await
    }

    async fn fetch_content(&self, record: &MessageRecord) -> Result<String, PipelineError> {
        let envelope = &record.envelope;
        match envelope.item_type {
            ItemType::Inline => {
                let raw = envelope.item_content.as_deref().ok_or_else(|| {
                    PipelineError::permanent(
                        RejectCode::InvalidContent,
                        "inline message without item_content",
                    )
                })?;
                if raw.len() > MAX_INLINE_CONTENT_SIZE {
                    return Err(PipelineError::permanent(
                        RejectCode::Oversized,
                        format!("inline content is {} bytes", raw.len()),
                    ));
                }
                if !envelope.matches_item_hash(raw.as_bytes()) {
                    return Err(PipelineError::permanent(
                        RejectCode::InvalidContent,
                        "item_content does not hash to item_hash",
                    ));
                }
                Ok(raw.to_string())
            }
            ItemType::Storage | ItemType::Ipfs => {
                let bytes = self
                    .storage
                    .fetch(&envelope.item_hash, self.settings.fetch_timeout)
                    .await?;
                if !envelope.matches_item_hash(&bytes) {
                    return Err(PipelineError::permanent(
                        RejectCode::InvalidContent,
                        "fetched content does not hash to item_hash",
                    ));
                }
                String::from_utf8(bytes).map_err(|_| {
                    PipelineError::permanent(
                        RejectCode::InvalidContent,
                        "message content is not valid utf-8",
                    )
                })
            }
        }
    }

    /// The single transaction that gives cross-source exactly-once: the
    /// insert is keyed on `item_hash`, later arrivals only merge their
    /// confirmation.
    async fn commit(
        &self,
        record: &MessageRecord,
        content: &MessageContent,
        raw: &str,
    ) -> Result<Processed, PipelineError> {
        let content_value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            PipelineError::permanent(RejectCode::InvalidContent, format!("content json: {e}"))
        })?;
        let size = raw.len() as u64;

        let handler_ctx = handlers::HandlerContext {
            storage: &self.storage,
            fetch_timeout: self.settings.fetch_timeout,
            temp_grace: self.storage_settings.temp_grace,
            normal_grace: self.storage_settings.normal_grace,
        };

        // serialization conflicts restart immediately a few times before
        // falling back to the queue's backoff
        let mut attempts = 0;
        loop {
            match self
                .try_commit(record, content, &content_value, size, &handler_ctx)
                .await
            {
                Err(PipelineError::Transient(err)) if attempts < 3 && is_conflict(&err) => {
                    attempts += 1;
                    tracing::debug!(
                        item_hash = %record.envelope.item_hash,
                        attempts,
                        "transaction conflict, restarting"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_commit(
        &self,
        record: &MessageRecord,
        content: &MessageContent,
        content_value: &serde_json::Value,
        size: u64,
        handler_ctx: &handlers::HandlerContext<'_>,
    ) -> Result<Processed, PipelineError> {
        let envelope = &record.envelope;
        let txn = self.db.begin().await?;

        let inserted = messages::insert(
            &txn,
            messages::NewMessage {
                item_hash: envelope.item_hash.to_string(),
                sender: envelope.sender.clone(),
                chain: envelope.chain.to_string(),
                message_type: envelope.message_type.to_string(),
                channel: envelope.channel.clone(),
                time: envelope.time,
                item_type: envelope.item_type.to_string(),
                content: content_value.clone(),
                item_content: (envelope.item_type == ItemType::Inline)
                    .then(|| envelope.item_content.clone())
                    .flatten(),
                size,
            },
        )
        .await?;

        if let Some(confirmation) = &record.confirmation {
            messages::add_confirmation(&txn, envelope.item_hash.as_str(), confirmation).await?;
        }

        if inserted {
            handlers::apply(&txn, handler_ctx, envelope, content).await?;
        }

        txn.commit().await?;
        Ok(if inserted {
            Processed::Applied
        } else {
            Processed::Deduplicated
        })
    }

    async fn maybe_publish(&self, record: &MessageRecord, outcome: Processed) {
        if record.origin != Origin::Http || outcome != Processed::Applied {
            return;
        }
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(err) = publisher.publish(&record.envelope).await {
            tracing::warn!(
                item_hash = %record.envelope.item_hash,
                error = ?err,
                "failed to publish accepted message"
            );
        }
    }
}

fn is_conflict(err: &anyhow::Error) -> bool {
    let Some(db_err) = err.downcast_ref::<DbErr>() else {
        return false;
    };
    let text = db_err.to_string();
    text.contains("40001")
        || text.contains("40P01")
        || text.contains("could not serialize")
        || text.contains("deadlock detected")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending_row() -> PendingMessage {
        PendingMessage {
            id: 7,
            item_hash: crate::types::sha256_hex(b"{}"),
            sender: "0xA".to_string(),
            chain: "ETH".to_string(),
            signature: Some("0xsig".to_string()),
            message_type: "AGGREGATE".to_string(),
            channel: Some("TEST".to_string()),
            time: 100.0,
            item_type: "inline".to_string(),
            item_content: Some("{}".to_string()),
            origin: "onchain".to_string(),
            conf_chain: Some("ETH".to_string()),
            conf_height: Some(1234),
            conf_tx_hash: Some("0xabc".to_string()),
            check_message: true,
            retries: 0,
            next_attempt_at: Utc::now(),
            claimed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn record_parses_confirmation() {
        let record = MessageRecord::try_from(&pending_row()).unwrap();
        let confirmation = record.confirmation.unwrap();
        assert_eq!(confirmation.chain, crate::types::Chain::Eth);
        assert_eq!(confirmation.height, 1234);
        assert_eq!(record.origin, Origin::Onchain);
    }

    #[test]
    fn partial_confirmation_is_rejected() {
        let mut row = pending_row();
        row.conf_height = None;
        assert!(MessageRecord::try_from(&row).is_err());
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let mut row = pending_row();
        row.chain = "DOGE".to_string();
        assert!(MessageRecord::try_from(&row).is_err());
    }
}
