use super::P2pClient;
use crate::{
    repository::{messages, pending_messages},
    settings::P2pSettings,
    types::{MessageEnvelope, Origin},
};
use futures::StreamExt;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Subscribes to the network topic and feeds announcements into the
/// pending queue. Content is never fetched here; that is the pipeline's
/// job.
pub struct Listener {
    db: DatabaseConnection,
    client: Arc<P2pClient>,
    settings: P2pSettings,
    high_watermark: u64,
}

impl Listener {
    pub fn new(
        db: DatabaseConnection,
        client: Arc<P2pClient>,
        settings: P2pSettings,
        high_watermark: u64,
    ) -> Self {
        Self {
            db,
            client,
            settings,
            high_watermark,
        }
    }

    #[instrument(name = "p2p_listener", skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let stream = match self.client.subscribe(&self.settings.topic).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = ?err, "p2p subscribe failed, reconnecting");
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = sleep(self.settings.reconnect_delay) => continue,
                    }
                }
            };
            tracing::info!(topic = self.settings.topic, "subscribed to p2p topic");

            let mut stream = Box::pin(stream);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    frame = stream.next() => match frame {
                        None => {
                            tracing::warn!("p2p stream closed, reconnecting");
                            break;
                        }
                        Some(Err(err)) => tracing::debug!(error = ?err, "dropping broken frame"),
                        Some(Ok(value)) => self.ingest(value).await,
                    }
                }
            }
        }
    }

    async fn ingest(&self, value: serde_json::Value) {
        // p2p is a hostile source; anything malformed is dropped silently
        let envelope: MessageEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed p2p envelope");
                return;
            }
        };

        if let Err(err) = self.ingest_envelope(&envelope).await {
            tracing::warn!(
                item_hash = %envelope.item_hash,
                error = ?err,
                "failed to enqueue p2p message"
            );
        }
    }

    async fn ingest_envelope(&self, envelope: &MessageEnvelope) -> Result<(), sea_orm::DbErr> {
        if pending_messages::count(&self.db).await? > self.high_watermark {
            tracing::warn!(
                item_hash = %envelope.item_hash,
                "pending queue over high watermark, dropping p2p message"
            );
            return Ok(());
        }

        let item_hash = envelope.item_hash.as_str();
        if pending_messages::exists(&self.db, item_hash).await?
            || messages::exists(&self.db, item_hash).await?
        {
            return Ok(());
        }

        pending_messages::insert(&self.db, envelope, Origin::P2p, None, true).await
    }
}
