use aleph_ccn_logic::settings::{
    BalancesSettings, ChainsSettings, P2pSettings, PendingTxSettings, PipelineSettings,
    StorageSettings,
};
use blockscout_service_launcher::{
    database::DatabaseSettings,
    launcher::ConfigSettings,
    tracing::{JaegerSettings, TracingSettings},
};
use serde::Deserialize;
use serde_with::serde_as;
use std::time;

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
    pub database: DatabaseSettings,

    pub storage: StorageSettings,
    #[serde(default)]
    pub chains: ChainsSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub pending_tx: PendingTxSettings,
    /// Without a daemon configured the node neither listens nor
    /// publishes; http and on-chain ingestion still work.
    #[serde(default)]
    pub p2p: Option<P2pSettings>,
    #[serde(default)]
    pub balances: BalancesSettings,
    /// How long the database may stay unreachable before the node shuts
    /// down instead of retrying forever.
    #[serde(default = "default_fatal_db_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub fatal_db_timeout: time::Duration,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "ALEPH_CCN";
}

fn default_fatal_db_timeout() -> time::Duration {
    time::Duration::from_secs(300)
}
