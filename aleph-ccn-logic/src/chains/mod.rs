pub mod evm;
pub mod nuls2;
pub mod settings;
pub mod tezos;

use crate::types::Chain;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// One resumable on-chain reader. `tick` scans from the stored cursor up
/// to the finalized head and appends to `pending_txs`; the supervision
/// loop below owns retries and pacing.
#[async_trait]
pub trait ChainIndexer: Send + Sync {
    fn chain(&self) -> Chain;
    fn poll_interval(&self) -> Duration;
    async fn tick(&self) -> Result<()>;
}

const RPC_BACKOFF_BASE: Duration = Duration::from_secs(1);
const RPC_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Drives an indexer until shutdown. RPC failures back off exponentially
/// and never escalate; the next successful tick resets the delay.
pub async fn run(indexer: Arc<dyn ChainIndexer>, shutdown: CancellationToken) {
    let chain = indexer.chain();
    let mut failures: u32 = 0;
    loop {
        let delay = if failures == 0 {
            indexer.poll_interval()
        } else {
            crate::pipeline::error::backoff(failures - 1, RPC_BACKOFF_BASE, RPC_BACKOFF_CAP)
        };
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(delay) => {}
        }

        match indexer.tick().await {
            Ok(()) => failures = 0,
            Err(err) => {
                failures += 1;
                tracing::warn!(%chain, failures, error = ?err, "indexer tick failed");
            }
        }
    }
}

/// A decoded on-chain sync payload: the message batch itself, or a CAS
/// reference to it.
#[derive(Debug, PartialEq)]
pub enum SyncBatch {
    Inline(Value),
    Reference(String),
}

#[derive(Deserialize)]
struct SyncPayload {
    protocol: String,
    version: u32,
    content: Value,
}

/// Parses the `{"protocol": ..., "version": 1, "content": ...}` wrapper
/// all chains publish.
pub fn decode_sync_payload(raw: &str) -> Result<SyncBatch> {
    let payload: SyncPayload = serde_json::from_str(raw)?;
    if payload.version != 1 {
        bail!("unsupported payload version {}", payload.version);
    }
    match payload.protocol.as_str() {
        "aleph" => {
            if !payload.content.is_array() {
                bail!("aleph payload content must be an array");
            }
            Ok(SyncBatch::Inline(payload.content))
        }
        "aleph-offchain" => match payload.content {
            Value::String(reference) => Ok(SyncBatch::Reference(reference)),
            _ => bail!("aleph-offchain payload content must be a string"),
        },
        other => bail!("unknown sync protocol {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_inline_batch() {
        let raw = json!({
            "protocol": "aleph",
            "version": 1,
            "content": [{"chain": "ETH"}]
        })
        .to_string();
        match decode_sync_payload(&raw).unwrap() {
            SyncBatch::Inline(content) => assert_eq!(content[0]["chain"], "ETH"),
            other => panic!("expected inline, got {other:?}"),
        }
    }

    #[test]
    fn decodes_offchain_reference() {
        let raw = json!({
            "protocol": "aleph-offchain",
            "version": 1,
            "content": "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH"
        })
        .to_string();
        assert_eq!(
            decode_sync_payload(&raw).unwrap(),
            SyncBatch::Reference("QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH".to_string())
        );
    }

    #[test]
    fn rejects_unknown_protocol_and_version() {
        assert!(decode_sync_payload(
            &json!({"protocol": "aleph", "version": 2, "content": []}).to_string()
        )
        .is_err());
        assert!(decode_sync_payload(
            &json!({"protocol": "other", "version": 1, "content": []}).to_string()
        )
        .is_err());
        assert!(decode_sync_payload("not json").is_err());
    }
}
