use crate::types::{Chain, TxProtocol};
use aleph_ccn_entity::{
    pending_txs::{ActiveModel, Column, Entity, Model},
    rejected_txs,
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    Statement,
};
use std::time::Duration;

pub struct NewPendingTx {
    pub chain: Chain,
    pub tx_hash: String,
    pub height: u64,
    pub tx_index: u32,
    pub publisher: String,
    pub protocol: TxProtocol,
    pub content: Option<serde_json::Value>,
    pub content_ref: Option<String>,
}

/// Idempotent append: re-scanned transactions (reorgs, restarts) hit the
/// `(chain, tx_hash)` unique key and are dropped.
pub async fn upsert_many<C: ConnectionTrait>(db: &C, txs: Vec<NewPendingTx>) -> Result<(), DbErr> {
    let now = Utc::now();
    let models: Vec<ActiveModel> = txs
        .into_iter()
        .map(|tx| ActiveModel {
            chain: Set(tx.chain.to_string()),
            tx_hash: Set(tx.tx_hash),
            height: Set(tx.height as i64),
            tx_index: Set(tx.tx_index as i32),
            publisher: Set(tx.publisher),
            protocol: Set(tx.protocol.as_str().to_string()),
            content: Set(tx.content),
            content_ref: Set(tx.content_ref),
            retries: Set(0),
            next_attempt_at: Set(now),
            created_at: Set(now),
            ..Default::default()
        })
        .collect();

    Entity::insert_many(models)
        .on_conflict(
            OnConflict::columns([Column::Chain, Column::TxHash])
                .do_nothing()
                .to_owned(),
        )
        .on_empty_do_nothing()
        .exec(db)
        .await?;
    Ok(())
}

/// Claims up to `limit` due rows for this worker. `FOR UPDATE SKIP LOCKED`
/// keeps concurrent workers from claiming the same rows; rows stuck in
/// `claimed_at` longer than `claim_timeout` are considered abandoned and
/// become claimable again.
pub async fn claim_batch<C: ConnectionTrait>(
    db: &C,
    limit: u64,
    claim_timeout: Duration,
) -> Result<Vec<Model>, DbErr> {
    let sql = r#"
        UPDATE pending_txs SET claimed_at = now()
        WHERE id IN (
            SELECT id FROM pending_txs
            WHERE next_attempt_at <= now()
              AND (claimed_at IS NULL OR claimed_at < now() - make_interval(secs => $1))
            ORDER BY next_attempt_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *;
    "#;
    Entity::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            [
                claim_timeout.as_secs_f64().into(),
                (limit as i64).into(),
            ],
        ))
        .all(db)
        .await
}

pub async fn reschedule<C: ConnectionTrait>(
    db: &C,
    id: i64,
    retries: u32,
    delay: Duration,
) -> Result<(), DbErr> {
    let next = Utc::now()
        + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(3600));
    Entity::update_many()
        .col_expr(Column::Retries, Expr::value(retries as i32))
        .col_expr(Column::NextAttemptAt, Expr::value(next))
        .col_expr(
            Column::ClaimedAt,
            Expr::value(Option::<chrono::DateTime<Utc>>::None),
        )
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// Terminal failure: record the reason and drop the row from the queue.
pub async fn reject<C: ConnectionTrait>(db: &C, tx: &Model, reason: &str) -> Result<(), DbErr> {
    rejected_txs::Entity::insert(rejected_txs::ActiveModel {
        chain: Set(tx.chain.clone()),
        tx_hash: Set(tx.tx_hash.clone()),
        reason: Set(reason.to_string()),
        rejected_at: Set(Utc::now()),
        ..Default::default()
    })
    .exec(db)
    .await?;
    Entity::delete_by_id(tx.id).exec(db).await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), DbErr> {
    Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    Entity::find().count(db).await
}
