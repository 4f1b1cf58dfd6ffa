use super::{decode_sync_payload, settings::Nuls2IndexerSettings, ChainIndexer, SyncBatch};
use crate::{
    metrics,
    repository::{chain_cursors, pending_txs},
    types::{Chain, TxProtocol},
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;

/// NULS2 indexer. Sync payloads travel as the remark of transfers to the
/// configured sync address.
pub struct Nuls2Indexer {
    db: DatabaseConnection,
    client: reqwest::Client,
    settings: Nuls2IndexerSettings,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct BlockHeader {
    height: u64,
    hash: String,
}

#[derive(Deserialize)]
struct Block {
    header: BlockHeader,
    #[serde(default)]
    txs: Vec<NulsTx>,
}

#[derive(Deserialize)]
struct NulsTx {
    hash: String,
    #[serde(default)]
    remark: Option<String>,
    #[serde(default, rename = "coinFroms")]
    coin_froms: Vec<CoinSide>,
    #[serde(default, rename = "coinTos")]
    coin_tos: Vec<CoinSide>,
}

#[derive(Deserialize)]
struct CoinSide {
    #[serde(default)]
    address: Option<String>,
}

impl Nuls2Indexer {
    pub fn new(db: DatabaseConnection, settings: Nuls2IndexerSettings) -> Result<Self> {
        Ok(Self {
            db,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            settings,
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let response: RpcResponse<T> = self
            .client
            .post(self.settings.rpc_url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(anyhow!("rpc error from {method}: {error}"));
        }
        response
            .result
            .ok_or_else(|| anyhow!("rpc response from {method} without result"))
    }

    fn decode_tx(&self, tx: &NulsTx, height: u64, tx_index: u32) -> Result<pending_txs::NewPendingTx> {
        let remark = tx.remark.as_deref().context("transfer without remark")?;
        // remarks arrive as plain JSON or base64-wrapped JSON depending
        // on the wallet
        let batch = decode_sync_payload(remark).or_else(|_| {
            let bytes = BASE64
                .decode(remark)
                .context("remark is neither json nor base64")?;
            let decoded = String::from_utf8(bytes).context("remark base64 is not utf-8")?;
            decode_sync_payload(&decoded)
        })?;

        let (protocol, content, content_ref) = match batch {
            SyncBatch::Inline(content) => (TxProtocol::BatchInline, Some(content), None),
            SyncBatch::Reference(reference) => (TxProtocol::BatchRef, None, Some(reference)),
        };

        Ok(pending_txs::NewPendingTx {
            chain: Chain::Nuls2,
            tx_hash: tx.hash.clone(),
            height,
            tx_index,
            publisher: tx
                .coin_froms
                .first()
                .and_then(|side| side.address.clone())
                .context("transfer without sender")?,
            protocol,
            content,
            content_ref,
        })
    }

    fn targets_sync_address(&self, tx: &NulsTx) -> bool {
        tx.coin_tos
            .iter()
            .any(|side| side.address.as_deref() == Some(self.settings.sync_address.as_str()))
    }
}

#[async_trait]
impl ChainIndexer for Nuls2Indexer {
    fn chain(&self) -> Chain {
        Chain::Nuls2
    }

    fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    async fn tick(&self) -> Result<()> {
        let head: BlockHeader = self
            .rpc("getBestBlockHeader", json!([self.settings.chain_id]))
            .await?;
        let safe = head.height.saturating_sub(self.settings.confirmation_depth);

        let cursor = chain_cursors::get(&self.db, Chain::Nuls2).await?;
        let from = match &cursor {
            Some(cursor) => cursor.last_height as u64 + 1,
            None => self.settings.start_height.unwrap_or(safe),
        };
        if from > safe {
            return Ok(());
        }
        // one bounded window per tick keeps a long catch-up interruptible
        let to = safe.min(from + self.settings.window - 1);

        let mut txs = Vec::new();
        let mut last_block_hash = None;
        for height in from..=to {
            let block: Block = self
                .rpc("getBlockByHeight", json!([self.settings.chain_id, height]))
                .await?;
            for (tx_index, tx) in block.txs.iter().enumerate() {
                if !self.targets_sync_address(tx) || tx.remark.is_none() {
                    continue;
                }
                match self.decode_tx(tx, height, tx_index as u32) {
                    Ok(tx) => txs.push(tx),
                    Err(err) => tracing::warn!(
                        tx_hash = tx.hash,
                        error = %err,
                        "skipping undecodable nuls2 transfer"
                    ),
                }
            }
            last_block_hash = Some(block.header.hash);
        }
        let last_tx_hash = txs.last().map(|tx| tx.tx_hash.clone());

        let txn = self.db.begin().await?;
        pending_txs::upsert_many(&txn, txs).await?;
        chain_cursors::upsert(&txn, Chain::Nuls2, to, last_block_hash, last_tx_hash).await?;
        txn.commit().await?;

        metrics::LAST_COMMITTED_HEIGHT
            .with_label_values(&[Chain::Nuls2.as_str()])
            .set(to as i64);
        Ok(())
    }
}
