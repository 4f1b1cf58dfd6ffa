use crate::types::Confirmation;
use aleph_ccn_entity::{
    message_confirmations,
    messages::{ActiveModel, Column, Entity, Model},
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
};

pub struct NewMessage {
    pub item_hash: String,
    pub sender: String,
    pub chain: String,
    pub message_type: String,
    pub channel: Option<String>,
    pub time: f64,
    pub item_type: String,
    pub content: serde_json::Value,
    pub item_content: Option<String>,
    pub size: u64,
}

/// Promotes a pending message into the confirmed store. Returns `false`
/// when a row with this `item_hash` already exists, which is the
/// cross-source dedup signal.
pub async fn insert<C: ConnectionTrait>(db: &C, message: NewMessage) -> Result<bool, DbErr> {
    let inserted = Entity::insert(ActiveModel {
        item_hash: Set(message.item_hash),
        sender: Set(message.sender),
        chain: Set(message.chain),
        message_type: Set(message.message_type),
        channel: Set(message.channel),
        time: Set(message.time),
        item_type: Set(message.item_type),
        content: Set(Some(message.content)),
        item_content: Set(message.item_content),
        size: Set(message.size as i64),
        forgotten_by: Set(None),
        created_at: Set(Utc::now()),
    })
    .on_conflict(OnConflict::column(Column::ItemHash).do_nothing().to_owned())
    .exec_without_returning(db)
    .await?;
    Ok(inserted > 0)
}

pub async fn get<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(item_hash).one(db).await
}

pub async fn exists<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<bool, DbErr> {
    Ok(Entity::find_by_id(item_hash).count(db).await? > 0)
}

/// Adds a confirmation to the message's set. The unique key makes
/// re-deliveries of the same on-chain confirmation idempotent.
pub async fn add_confirmation<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
    confirmation: &Confirmation,
) -> Result<(), DbErr> {
    message_confirmations::Entity::insert(message_confirmations::ActiveModel {
        item_hash: Set(item_hash.to_string()),
        chain: Set(confirmation.chain.to_string()),
        height: Set(confirmation.height as i64),
        tx_hash: Set(confirmation.tx_hash.clone()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([
            message_confirmations::Column::ItemHash,
            message_confirmations::Column::Chain,
            message_confirmations::Column::TxHash,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(db)
    .await?;
    Ok(())
}

pub async fn confirmations<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
) -> Result<Vec<message_confirmations::Model>, DbErr> {
    message_confirmations::Entity::find()
        .filter(message_confirmations::Column::ItemHash.eq(item_hash))
        .all(db)
        .await
}

/// FORGET tombstone: the row survives with its content nulled so the
/// hash can never be re-published with different content.
pub async fn tombstone<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
    forgotten_by: &str,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::Content, Expr::value(Option::<serde_json::Value>::None))
        .col_expr(Column::ItemContent, Expr::value(Option::<String>::None))
        .col_expr(Column::ForgottenBy, Expr::value(Some(forgotten_by.to_string())))
        .filter(Column::ItemHash.eq(item_hash))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    Entity::find().count(db).await
}
