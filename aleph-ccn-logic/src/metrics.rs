use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, IntCounterVec, IntGauge,
    IntGaugeVec,
};
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::repository::{messages, pending_messages, pending_txs};

lazy_static! {
    pub static ref PENDING_MESSAGES_TOTAL: IntGauge = register_int_gauge!(
        "aleph_ccn_pending_messages_total",
        "number of rows in the pending message queue",
    )
    .unwrap();
    pub static ref PENDING_TXS_TOTAL: IntGauge = register_int_gauge!(
        "aleph_ccn_pending_txs_total",
        "number of rows in the pending transaction queue",
    )
    .unwrap();
    pub static ref MESSAGES_TOTAL: IntGauge = register_int_gauge!(
        "aleph_ccn_messages_total",
        "number of confirmed messages",
    )
    .unwrap();
    pub static ref LAST_COMMITTED_HEIGHT: IntGaugeVec = register_int_gauge_vec!(
        "aleph_ccn_last_committed_height",
        "last chain height whose transactions were written to the pending queue",
        &["chain"],
    )
    .unwrap();
    pub static ref MESSAGES_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "aleph_ccn_messages_processed",
        "pipeline outcomes by message type",
        &["message_type", "outcome"],
    )
    .unwrap();
}

const REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Periodically refreshes the queue gauges from table counts. Spawned by
/// the server next to the pipeline workers.
pub async fn run_updater(db: DatabaseConnection, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(REFRESH_INTERVAL) => {}
        }

        match gather(&db).await {
            Ok((pending_messages, pending_txs, messages)) => {
                PENDING_MESSAGES_TOTAL.set(pending_messages as i64);
                PENDING_TXS_TOTAL.set(pending_txs as i64);
                MESSAGES_TOTAL.set(messages as i64);
            }
            Err(err) => tracing::warn!(error = ?err, "failed to refresh queue gauges"),
        }
    }
}

async fn gather(db: &DatabaseConnection) -> Result<(u64, u64, u64), sea_orm::DbErr> {
    Ok((
        pending_messages::count(db).await?,
        pending_txs::count(db).await?,
        messages::count(db).await?,
    ))
}
