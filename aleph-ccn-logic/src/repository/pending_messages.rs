use crate::types::{Confirmation, MessageEnvelope, MessageType, Origin};
use aleph_ccn_entity::{
    pending_messages::{ActiveModel, Column, Entity, Model},
    rejected_messages,
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, Statement,
};
use std::time::Duration;

fn active_model(
    envelope: &MessageEnvelope,
    origin: Origin,
    confirmation: Option<&Confirmation>,
    check_message: bool,
) -> ActiveModel {
    let now = Utc::now();
    ActiveModel {
        item_hash: Set(envelope.item_hash.to_string()),
        sender: Set(envelope.sender.clone()),
        chain: Set(envelope.chain.to_string()),
        signature: Set(envelope.signature.clone()),
        message_type: Set(envelope.message_type.to_string()),
        channel: Set(envelope.channel.clone()),
        time: Set(envelope.time),
        item_type: Set(envelope.item_type.to_string()),
        item_content: Set(envelope.item_content.clone()),
        origin: Set(origin.as_str().to_string()),
        conf_chain: Set(confirmation.map(|c| c.chain.to_string())),
        conf_height: Set(confirmation.map(|c| c.height as i64)),
        conf_tx_hash: Set(confirmation.map(|c| c.tx_hash.clone())),
        check_message: Set(check_message),
        retries: Set(0),
        next_attempt_at: Set(now),
        created_at: Set(now),
        ..Default::default()
    }
}

pub async fn insert<C: ConnectionTrait>(
    db: &C,
    envelope: &MessageEnvelope,
    origin: Origin,
    confirmation: Option<&Confirmation>,
    check_message: bool,
) -> Result<(), DbErr> {
    Entity::insert(active_model(envelope, origin, confirmation, check_message))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn insert_many<C: ConnectionTrait>(
    db: &C,
    envelopes: &[MessageEnvelope],
    origin: Origin,
    confirmation: Option<&Confirmation>,
    check_message: bool,
) -> Result<(), DbErr> {
    if envelopes.is_empty() {
        return Ok(());
    }
    let models: Vec<ActiveModel> = envelopes
        .iter()
        .map(|envelope| active_model(envelope, origin, confirmation, check_message))
        .collect();
    Entity::insert_many(models).exec(db).await?;
    Ok(())
}

/// Claims up to `limit` due rows of one message type. Each type has its
/// own worker group, so the claim never mixes types.
pub async fn claim_batch<C: ConnectionTrait>(
    db: &C,
    message_type: MessageType,
    limit: u64,
    claim_timeout: Duration,
) -> Result<Vec<Model>, DbErr> {
    let sql = r#"
        UPDATE pending_messages SET claimed_at = now()
        WHERE id IN (
            SELECT id FROM pending_messages
            WHERE message_type = $1
              AND next_attempt_at <= now()
              AND (claimed_at IS NULL OR claimed_at < now() - make_interval(secs => $2))
            ORDER BY next_attempt_at
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *;
    "#;
    Entity::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            [
                message_type.as_str().into(),
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

/// Terminal rejection: keep the full envelope for debugging, drop the row.
pub async fn reject<C: ConnectionTrait>(
    db: &C,
    row: &Model,
    error_code: &str,
    reason: &str,
) -> Result<(), DbErr> {
    let envelope = serde_json::json!({
        "chain": row.chain,
        "sender": row.sender,
        "type": row.message_type,
        "channel": row.channel,
        "time": row.time,
        "item_type": row.item_type,
        "item_hash": row.item_hash,
        "signature": row.signature,
        "origin": row.origin,
    });
    rejected_messages::Entity::insert(rejected_messages::ActiveModel {
        item_hash: Set(row.item_hash.clone()),
        message: Set(envelope),
        error_code: Set(error_code.to_string()),
        reason: Set(reason.to_string()),
        rejected_at: Set(Utc::now()),
        ..Default::default()
    })
    .exec(db)
    .await?;
    Entity::delete_by_id(row.id).exec(db).await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), DbErr> {
    Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

pub async fn exists<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<bool, DbErr> {
    Ok(Entity::find()
        .filter(Column::ItemHash.eq(item_hash))
        .count(db)
        .await?
        > 0)
}

pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    Entity::find().count(db).await
}
