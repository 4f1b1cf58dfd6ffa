use super::{decode_sync_payload, settings::EvmIndexerSettings, ChainIndexer, SyncBatch};
use crate::{
    metrics,
    repository::{balances, chain_cursors, pending_txs},
    types::{Chain, TxProtocol},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethabi::{Event, EventParam, ParamType, RawLog, Token};
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{Address, Filter, Log, H256},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::{collections::HashMap, str::FromStr, time::Duration};

/// Indexer for the EVM family (ETH, BNB). Watches the messaging
/// contract's `SyncEvent` logs and, optionally, an ERC-20 transfer set
/// feeding the balance table.
pub struct EvmIndexer {
    chain: Chain,
    db: DatabaseConnection,
    provider: Provider<Http>,
    contract: Address,
    sync_event: Event,
    transfer: Option<(Address, Event)>,
    settings: EvmIndexerSettings,
}

impl EvmIndexer {
    pub fn new(chain: Chain, db: DatabaseConnection, settings: EvmIndexerSettings) -> Result<Self> {
        let provider =
            Provider::<Http>::try_from(settings.rpc_url.as_str()).context("evm rpc url")?;
        let contract =
            Address::from_str(&settings.contract_address).context("messaging contract address")?;
        let transfer = settings
            .balance_contract
            .as_deref()
            .map(|address| {
                Address::from_str(address)
                    .context("balance contract address")
                    .map(|address| (address, transfer_event()))
            })
            .transpose()?;

        Ok(Self {
            chain,
            db,
            provider,
            contract,
            sync_event: sync_event(),
            transfer,
            settings,
        })
    }

    async fn scan_range(&self, from: u64, to: u64) -> Result<()> {
        let filter = Filter::new()
            .address(self.contract)
            .topic0(H256::from(self.sync_event.signature().0))
            .from_block(from)
            .to_block(to);
        let logs = self.provider.get_logs(&filter).await?;

        let mut txs = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.decode_sync_log(log) {
                Ok(tx) => txs.push(tx),
                Err(err) => tracing::warn!(
                    chain = %self.chain,
                    tx_hash = ?log.transaction_hash,
                    error = %err,
                    "skipping undecodable sync log"
                ),
            }
        }

        let block_hash = self
            .provider
            .get_block(to)
            .await?
            .and_then(|block| block.hash)
            .map(|hash| format!("{hash:?}"));
        let last_tx_hash = txs.last().map(|tx| tx.tx_hash.clone());
        let tx_count = txs.len();

        let txn = self.db.begin().await?;
        pending_txs::upsert_many(&txn, txs).await?;
        chain_cursors::upsert(&txn, self.chain, to, block_hash, last_tx_hash).await?;
        txn.commit().await?;

        metrics::LAST_COMMITTED_HEIGHT
            .with_label_values(&[self.chain.as_str()])
            .set(to as i64);
        if tx_count > 0 {
            tracing::info!(chain = %self.chain, from, to, tx_count, "indexed sync events");
        }

        if let Some((token_contract, _)) = &self.transfer {
            self.scan_transfers(*token_contract, from, to).await?;
        }
        Ok(())
    }

    fn decode_sync_log(&self, log: &Log) -> Result<pending_txs::NewPendingTx> {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = self.sync_event.parse_log(raw)?;

        let publisher = match &parsed.params[1].value {
            Token::Address(address) => format!("{address:?}"),
            other => anyhow::bail!("unexpected publisher token {other:?}"),
        };
        let message = match &parsed.params[2].value {
            Token::String(message) => message.clone(),
            other => anyhow::bail!("unexpected message token {other:?}"),
        };

        let (protocol, content, content_ref) = match decode_sync_payload(&message)? {
            SyncBatch::Inline(content) => (TxProtocol::BatchInline, Some(content), None),
            SyncBatch::Reference(reference) => (TxProtocol::BatchRef, None, Some(reference)),
        };

        Ok(pending_txs::NewPendingTx {
            chain: self.chain,
            tx_hash: log
                .transaction_hash
                .map(|hash| format!("{hash:?}"))
                .context("log without transaction hash")?,
            height: log
                .block_number
                .map(|n| n.as_u64())
                .context("log without block number")?,
            tx_index: log
                .transaction_index
                .map(|index| index.as_u64() as u32)
                .unwrap_or(0),
            publisher,
            protocol,
            content,
            content_ref,
        })
    }

    /// Folds the window's transfers into per-address deltas and applies
    /// them stamped with the window end; the balance table's height
    /// guard makes re-scans no-ops.
    async fn scan_transfers(&self, token_contract: Address, from: u64, to: u64) -> Result<()> {
        let (_, event) = self.transfer.as_ref().expect("caller checked");
        let filter = Filter::new()
            .address(token_contract)
            .topic0(H256::from(event.signature().0))
            .from_block(from)
            .to_block(to);

        let mut deltas: HashMap<String, f64> = HashMap::new();
        for log in self.provider.get_logs(&filter).await? {
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            let Ok(parsed) = event.parse_log(raw) else {
                continue;
            };
            let (Token::Address(sender), Token::Address(receiver), Token::Uint(value)) = (
                &parsed.params[0].value,
                &parsed.params[1].value,
                &parsed.params[2].value,
            ) else {
                continue;
            };
            // whole tokens, 18 decimals
            let amount = value.to_string().parse::<f64>().unwrap_or(0.0) / 1e18;
            *deltas.entry(format!("{sender:?}")).or_default() -= amount;
            *deltas.entry(format!("{receiver:?}")).or_default() += amount;
        }

        for (address, delta) in deltas {
            balances::apply_delta(&self.db, &address, self.chain, &self.settings.token, delta, to)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChainIndexer for EvmIndexer {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    async fn tick(&self) -> Result<()> {
        let head = self.provider.get_block_number().await?.as_u64();
        let safe = head.saturating_sub(self.settings.confirmation_depth);

        let cursor = chain_cursors::get(&self.db, self.chain).await?;
        let mut from = match &cursor {
            Some(cursor) => cursor.last_height as u64 + 1,
            None => self.settings.start_height.unwrap_or(safe),
        };

        // shallow reorg: the block we last committed is gone, rewind and
        // re-scan (the pending_txs upsert is idempotent)
        if let Some(cursor) = &cursor {
            if let Some(stored_hash) = &cursor.last_block_hash {
                let last_height = cursor.last_height as u64;
                let onchain_hash = self
                    .provider
                    .get_block(last_height)
                    .await?
                    .and_then(|block| block.hash)
                    .map(|hash| format!("{hash:?}"));
                if onchain_hash.as_deref() != Some(stored_hash.as_str()) {
                    from = last_height.saturating_sub(self.settings.confirmation_depth);
                    tracing::warn!(
                        chain = %self.chain,
                        last_height,
                        rescan_from = from,
                        "reorg detected, rewinding cursor"
                    );
                }
            }
        }

        if from > safe {
            return Ok(());
        }

        let mut start = from;
        while start <= safe {
            let end = safe.min(start + self.settings.window - 1);
            self.scan_range(start, end).await?;
            start = end + 1;
        }
        Ok(())
    }
}

fn sync_event() -> Event {
    Event {
        name: "SyncEvent".to_string(),
        inputs: vec![
            EventParam {
                name: "timestamp".to_string(),
                kind: ParamType::Uint(256),
                indexed: false,
            },
            EventParam {
                name: "addr".to_string(),
                kind: ParamType::Address,
                indexed: false,
            },
            EventParam {
                name: "message".to_string(),
                kind: ParamType::String,
                indexed: false,
            },
        ],
        anonymous: false,
    }
}

fn transfer_event() -> Event {
    Event {
        name: "Transfer".to_string(),
        inputs: vec![
            EventParam {
                name: "from".to_string(),
                kind: ParamType::Address,
                indexed: true,
            },
            EventParam {
                name: "to".to_string(),
                kind: ParamType::Address,
                indexed: true,
            },
            EventParam {
                name: "value".to_string(),
                kind: ParamType::Uint(256),
                indexed: false,
            },
        ],
        anonymous: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_signatures_match_solidity() {
        assert_eq!(
            sync_event().signature().0,
            ethers::utils::keccak256("SyncEvent(uint256,address,string)"),
        );
        // the canonical ERC-20 Transfer topic
        assert_eq!(
            hex::encode(transfer_event().signature()),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
        );
    }

    #[test]
    fn decodes_inline_sync_log() {
        let message = serde_json::json!({
            "protocol": "aleph",
            "version": 1,
            "content": []
        })
        .to_string();
        let data = ethabi::encode(&[
            Token::Uint(1_700_000_000u64.into()),
            Token::Address(Address::repeat_byte(0xaa)),
            Token::String(message),
        ]);
        let raw = RawLog {
            topics: vec![H256::from(sync_event().signature().0)],
            data,
        };

        let parsed = sync_event().parse_log(raw).unwrap();
        assert!(matches!(&parsed.params[1].value, Token::Address(a) if *a == Address::repeat_byte(0xaa)));
        match &parsed.params[2].value {
            Token::String(message) => {
                assert!(matches!(
                    decode_sync_payload(message).unwrap(),
                    SyncBatch::Inline(_)
                ));
            }
            other => panic!("unexpected token {other:?}"),
        }
    }
}
