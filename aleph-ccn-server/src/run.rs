use crate::Settings;
use aleph_ccn_logic::{
    balances::Reconciler,
    chains::{self, evm::EvmIndexer, nuls2::Nuls2Indexer, tezos::TezosIndexer, ChainIndexer},
    metrics,
    p2p::{Listener, P2pClient, Publisher},
    pending_tx::TxProcessor,
    pipeline::MessagePipeline,
    storage::{gc, Storage},
    types::Chain,
};
use anyhow::Context;
use blockscout_service_launcher::database;
use migration::Migrator;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    let db = database::initialize_postgres::<Migrator>(&settings.database).await?;
    let storage = Arc::new(Storage::new(&settings.storage).context("storage initialization")?);

    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // p2p first so the pipeline can publish into it
    let publisher = match &settings.p2p {
        Some(p2p_settings) => {
            let client = Arc::new(P2pClient::new(p2p_settings).context("p2p client")?);
            let listener = Listener::new(
                db.clone(),
                client.clone(),
                p2p_settings.clone(),
                settings.pipeline.high_watermark,
            );
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move { listener.run(token).await }));
            Some(Arc::new(Publisher::new(client, p2p_settings)))
        }
        None => None,
    };

    let pipeline = MessagePipeline::new(
        db.clone(),
        storage.clone(),
        publisher,
        settings.pipeline.clone(),
        settings.storage.clone(),
    );
    let token = shutdown.clone();
    tasks.push(tokio::spawn(async move { pipeline.start(token).await }));

    let tx_processor = TxProcessor::new(
        db.clone(),
        storage.clone(),
        settings.pending_tx.clone(),
        settings.pipeline.fetch_timeout,
        settings.pipeline.high_watermark,
    );
    let token = shutdown.clone();
    tasks.push(tokio::spawn(async move { tx_processor.run(token).await }));

    let mut indexers: Vec<Arc<dyn ChainIndexer>> = Vec::new();
    for (chain, evm_settings) in [
        (Chain::Eth, &settings.chains.eth),
        (Chain::Bnb, &settings.chains.bnb),
    ] {
        if let Some(evm_settings) = evm_settings {
            indexers.push(Arc::new(
                EvmIndexer::new(chain, db.clone(), evm_settings.clone())
                    .with_context(|| format!("{chain} indexer"))?,
            ));
        }
    }
    if let Some(tezos_settings) = &settings.chains.tezos {
        indexers.push(Arc::new(
            TezosIndexer::new(db.clone(), tezos_settings.clone()).context("tezos indexer")?,
        ));
    }
    if let Some(nuls2_settings) = &settings.chains.nuls2 {
        indexers.push(Arc::new(
            Nuls2Indexer::new(db.clone(), nuls2_settings.clone()).context("nuls2 indexer")?,
        ));
    }
    for indexer in indexers {
        tracing::info!(chain = %indexer.chain(), "starting chain indexer");
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            chains::run(indexer, token).await
        }));
    }

    let token = shutdown.clone();
    let gc_db = db.clone();
    let gc_storage = storage.clone();
    let gc_settings = settings.storage.clone();
    tasks.push(tokio::spawn(async move {
        gc::run(gc_db, gc_storage, gc_settings, token).await
    }));

    let reconciler = Reconciler::new(db.clone(), settings.balances.clone());
    let token = shutdown.clone();
    tasks.push(tokio::spawn(async move { reconciler.run(token).await }));

    let token = shutdown.clone();
    let metrics_db = db.clone();
    tasks.push(tokio::spawn(async move {
        metrics::run_updater(metrics_db, token).await
    }));

    let token = shutdown.clone();
    let watchdog_db = db.clone();
    let fatal_db_timeout = settings.fatal_db_timeout;
    tasks.push(tokio::spawn(async move {
        db_watchdog(watchdog_db, fatal_db_timeout, token).await
    }));

    tracing::info!("node started");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down, draining in-flight work"),
        _ = shutdown.cancelled() => tracing::error!("database unreachable, shutting down"),
    }
    shutdown.cancel();

    // workers finish their claimed rows; anything still running after the
    // cap is abandoned and becomes re-claimable via claim_timeout
    if tokio::time::timeout(DRAIN_TIMEOUT, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        tracing::warn!(?DRAIN_TIMEOUT, "drain timed out, abandoning in-flight workers");
    }
    Ok(())
}

/// Pipeline errors are never fatal, but a database that stays down past
/// `fatal_db_timeout` ends the process so the orchestrator can restart
/// it somewhere healthier.
async fn db_watchdog(
    db: sea_orm::DatabaseConnection,
    fatal_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut down_since: Option<tokio::time::Instant> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(15)) => {}
        }

        match db.ping().await {
            Ok(()) => down_since = None,
            Err(err) => {
                let since = *down_since.get_or_insert_with(tokio::time::Instant::now);
                tracing::warn!(error = ?err, "database ping failed");
                if since.elapsed() > fatal_timeout {
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}
