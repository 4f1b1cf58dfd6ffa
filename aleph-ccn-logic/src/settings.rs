use crate::chains::settings::{EvmIndexerSettings, Nuls2IndexerSettings, TezosIndexerSettings};
use serde::Deserialize;
use serde_with::serde_as;
use std::{path::PathBuf, time};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainsSettings {
    pub eth: Option<EvmIndexerSettings>,
    pub bnb: Option<EvmIndexerSettings>,
    pub tezos: Option<TezosIndexerSettings>,
    pub nuls2: Option<Nuls2IndexerSettings>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_fetch_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub fetch_timeout: time::Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_base: time::Duration,
    #[serde(default = "default_retry_cap")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_cap: time::Duration,
    #[serde(default = "default_claim_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub claim_timeout: time::Duration,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: time::Duration,
    #[serde(default = "default_high_watermark")]
    pub high_watermark: u64,
    #[serde(default)]
    pub concurrency: TypeConcurrency,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout: default_fetch_timeout(),
            max_retries: default_max_retries(),
            retry_base: default_retry_base(),
            retry_cap: default_retry_cap(),
            claim_timeout: default_claim_timeout(),
            poll_interval: default_poll_interval(),
            high_watermark: default_high_watermark(),
            concurrency: TypeConcurrency::default(),
        }
    }
}

/// Worker counts per message type. Heavy STORE processing gets its own
/// bounded group so it cannot starve light AGGREGATE traffic.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TypeConcurrency {
    #[serde(default = "default_light_workers")]
    pub aggregate: u32,
    #[serde(default = "default_light_workers")]
    pub post: u32,
    #[serde(default = "default_store_workers")]
    pub store: u32,
    #[serde(default = "default_light_workers")]
    pub forget: u32,
    #[serde(default = "default_program_workers")]
    pub program: u32,
}

impl Default for TypeConcurrency {
    fn default() -> Self {
        Self {
            aggregate: default_light_workers(),
            post: default_light_workers(),
            store: default_store_workers(),
            forget: default_light_workers(),
            program: default_program_workers(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PendingTxSettings {
    #[serde(default = "default_tx_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_tx_poll_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: time::Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_base: time::Duration,
    #[serde(default = "default_retry_cap")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_cap: time::Duration,
    #[serde(default = "default_claim_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub claim_timeout: time::Duration,
}

impl Default for PendingTxSettings {
    fn default() -> Self {
        Self {
            batch_size: default_tx_batch_size(),
            poll_interval: default_tx_poll_interval(),
            max_retries: default_max_retries(),
            retry_base: default_retry_base(),
            retry_cap: default_retry_cap(),
            claim_timeout: default_claim_timeout(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub ipfs: Option<IpfsSettings>,
    #[serde(default = "default_temp_grace")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub temp_grace: time::Duration,
    #[serde(default = "default_normal_grace")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub normal_grace: time::Duration,
    #[serde(default = "default_gc_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub gc_interval: time::Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            ipfs: None,
            temp_grace: default_temp_grace(),
            normal_grace: default_normal_grace(),
            gc_interval: default_gc_interval(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IpfsSettings {
    pub url: Url,
    #[serde(default = "default_ipfs_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: time::Duration,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct P2pSettings {
    pub daemon_url: Url,
    pub ws_url: Url,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_publish_rate")]
    pub publish_rate: u32,
    #[serde(default = "default_reconnect_delay")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub reconnect_delay: time::Duration,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BalancesSettings {
    #[serde(default = "default_reconcile_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: time::Duration,
    /// Storage allowance bought by one whole token, in bytes.
    #[serde(default = "default_bytes_per_token")]
    pub bytes_per_token: u64,
}

impl Default for BalancesSettings {
    fn default() -> Self {
        Self {
            interval: default_reconcile_interval(),
            bytes_per_token: default_bytes_per_token(),
        }
    }
}

fn default_batch_size() -> u64 {
    64
}

fn default_fetch_timeout() -> time::Duration {
    time::Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_base() -> time::Duration {
    time::Duration::from_secs(5)
}

fn default_retry_cap() -> time::Duration {
    time::Duration::from_secs(3600)
}

fn default_claim_timeout() -> time::Duration {
    time::Duration::from_secs(300)
}

fn default_poll_interval() -> time::Duration {
    time::Duration::from_secs(1)
}

fn default_high_watermark() -> u64 {
    100_000
}

fn default_light_workers() -> u32 {
    4
}

fn default_store_workers() -> u32 {
    2
}

fn default_program_workers() -> u32 {
    1
}

fn default_tx_batch_size() -> u64 {
    16
}

fn default_tx_poll_interval() -> time::Duration {
    time::Duration::from_secs(5)
}

fn default_temp_grace() -> time::Duration {
    time::Duration::from_secs(3600)
}

fn default_normal_grace() -> time::Duration {
    time::Duration::from_secs(24 * 3600)
}

fn default_gc_interval() -> time::Duration {
    time::Duration::from_secs(3600)
}

fn default_ipfs_timeout() -> time::Duration {
    time::Duration::from_secs(60)
}

fn default_topic() -> String {
    "ALEPH-TEST".to_string()
}

fn default_publish_rate() -> u32 {
    50
}

fn default_reconnect_delay() -> time::Duration {
    time::Duration::from_secs(5)
}

fn default_reconcile_interval() -> time::Duration {
    time::Duration::from_secs(600)
}

fn default_bytes_per_token() -> u64 {
    3 * 1024 * 1024
}
