use serde::Deserialize;
use serde_with::serde_as;
use std::time;
use url::Url;

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EvmIndexerSettings {
    pub rpc_url: String,
    pub contract_address: String,
    #[serde(default)]
    pub start_height: Option<u64>,
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    #[serde(default = "default_window")]
    pub window: u64,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: time::Duration,
    /// ERC-20 contract whose transfers feed the balance table.
    #[serde(default)]
    pub balance_contract: Option<String>,
    #[serde(default = "default_token")]
    pub token: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TezosIndexerSettings {
    /// A TzKT-style indexer API base url.
    pub api_url: Url,
    pub contract_address: String,
    #[serde(default)]
    pub start_level: Option<u64>,
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    #[serde(default = "default_window")]
    pub window: u64,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: time::Duration,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Nuls2IndexerSettings {
    pub rpc_url: Url,
    /// Transfers to this address carry sync payloads in their remark.
    pub sync_address: String,
    #[serde(default = "default_nuls_chain_id")]
    pub chain_id: u16,
    #[serde(default)]
    pub start_height: Option<u64>,
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    #[serde(default = "default_window")]
    pub window: u64,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: time::Duration,
}

fn default_confirmation_depth() -> u64 {
    12
}

fn default_window() -> u64 {
    5000
}

fn default_poll_interval() -> time::Duration {
    time::Duration::from_secs(10)
}

fn default_token() -> String {
    "ALEPH".to_string()
}

fn default_nuls_chain_id() -> u16 {
    1
}
