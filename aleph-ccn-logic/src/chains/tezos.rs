use super::{decode_sync_payload, settings::TezosIndexerSettings, ChainIndexer, SyncBatch};
use crate::{
    metrics,
    repository::{chain_cursors, pending_txs},
    types::{Chain, TxProtocol},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Tezos indexer over a TzKT-style API: applied transactions targeting
/// the messaging contract, the sync payload in the call parameter.
pub struct TezosIndexer {
    db: DatabaseConnection,
    client: reqwest::Client,
    settings: TezosIndexerSettings,
}

#[derive(Deserialize)]
struct HeadResponse {
    level: u64,
}

#[derive(Deserialize)]
struct Transaction {
    level: u64,
    hash: String,
    #[serde(default)]
    counter: u32,
    #[serde(default)]
    sender: Option<AccountRef>,
    #[serde(default)]
    parameter: Option<Parameter>,
}

#[derive(Deserialize)]
struct AccountRef {
    address: String,
}

#[derive(Deserialize)]
struct Parameter {
    #[serde(default)]
    value: Value,
}

impl TezosIndexer {
    pub fn new(db: DatabaseConnection, settings: TezosIndexerSettings) -> Result<Self> {
        Ok(Self {
            db,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            settings,
        })
    }

    async fn head_level(&self) -> Result<u64> {
        let url = self.settings.api_url.join("v1/head")?;
        let head: HeadResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(head.level)
    }

    async fn transactions(&self, from: u64, to: u64) -> Result<Vec<Transaction>> {
        let url = self.settings.api_url.join("v1/operations/transactions")?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("target", self.settings.contract_address.as_str()),
                ("status", "applied"),
                ("level.ge", &from.to_string()),
                ("level.le", &to.to_string()),
                ("limit", "10000"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    fn decode_tx(&self, tx: &Transaction) -> Result<pending_txs::NewPendingTx> {
        let parameter = tx.parameter.as_ref().context("transaction without parameter")?;
        // the contract takes the payload as a plain string argument
        let raw = parameter
            .value
            .as_str()
            .context("parameter value is not a string")?;

        let (protocol, content, content_ref) = match decode_sync_payload(raw)? {
            SyncBatch::Inline(content) => (TxProtocol::BatchInline, Some(content), None),
            SyncBatch::Reference(reference) => (TxProtocol::BatchRef, None, Some(reference)),
        };

        Ok(pending_txs::NewPendingTx {
            chain: Chain::Tezos,
            tx_hash: tx.hash.clone(),
            height: tx.level,
            tx_index: tx.counter,
            publisher: tx
                .sender
                .as_ref()
                .map(|sender| sender.address.clone())
                .context("transaction without sender")?,
            protocol,
            content,
            content_ref,
        })
    }
}

#[async_trait]
impl ChainIndexer for TezosIndexer {
    fn chain(&self) -> Chain {
        Chain::Tezos
    }

    fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    async fn tick(&self) -> Result<()> {
        let head = self.head_level().await?;
        let safe = head.saturating_sub(self.settings.confirmation_depth);

        let cursor = chain_cursors::get(&self.db, Chain::Tezos).await?;
        let from = match &cursor {
            Some(cursor) => cursor.last_height as u64 + 1,
            None => self.settings.start_level.unwrap_or(safe),
        };
        if from > safe {
            return Ok(());
        }

        let mut start = from;
        while start <= safe {
            let end = safe.min(start + self.settings.window - 1);
            let transactions = self.transactions(start, end).await?;

            let mut txs = Vec::new();
            for tx in &transactions {
                match self.decode_tx(tx) {
                    Ok(tx) => txs.push(tx),
                    Err(err) => tracing::warn!(
                        tx_hash = tx.hash,
                        error = %err,
                        "skipping undecodable tezos call"
                    ),
                }
            }
            let last_tx_hash = txs.last().map(|tx| tx.tx_hash.clone());

            let txn = self.db.begin().await?;
            pending_txs::upsert_many(&txn, txs).await?;
            chain_cursors::upsert(&txn, Chain::Tezos, end, None, last_tx_hash).await?;
            txn.commit().await?;

            metrics::LAST_COMMITTED_HEIGHT
                .with_label_values(&[Chain::Tezos.as_str()])
                .set(end as i64);
            start = end + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn settings(server: &MockServer) -> TezosIndexerSettings {
        serde_json::from_value(serde_json::json!({
            "api_url": server.uri(),
            "contract_address": "KT1BfL57oZfptdtMFZ9LNakEPvuPPA2urdSW",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn reads_head_level() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/head"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"level": 4242})),
            )
            .mount(&server)
            .await;

        let indexer = TezosIndexer::new(sea_orm::DatabaseConnection::Disconnected, settings(&server))
            .unwrap();
        assert_eq!(indexer.head_level().await.unwrap(), 4242);
    }

    #[tokio::test]
    async fn parses_applied_transactions() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({
            "protocol": "aleph",
            "version": 1,
            "content": []
        })
        .to_string();
        Mock::given(method("GET"))
            .and(path("/v1/operations/transactions"))
            .and(query_param("status", "applied"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "level": 100,
                "hash": "oo6oNN9Wz3ddQ6JIlVJNjyyVxDS92PpXhQZpB5Z2NnE9Vk9vDvT",
                "counter": 7,
                "sender": {"address": "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"},
                "parameter": {"entrypoint": "default", "value": payload}
            }])))
            .mount(&server)
            .await;

        let indexer = TezosIndexer::new(sea_orm::DatabaseConnection::Disconnected, settings(&server))
            .unwrap();
        let transactions = indexer.transactions(1, 200).await.unwrap();
        assert_eq!(transactions.len(), 1);

        let tx = indexer.decode_tx(&transactions[0]).unwrap();
        assert_eq!(tx.chain, Chain::Tezos);
        assert_eq!(tx.height, 100);
        assert_eq!(tx.publisher, "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb");
        assert_eq!(tx.protocol, TxProtocol::BatchInline);
    }
}
