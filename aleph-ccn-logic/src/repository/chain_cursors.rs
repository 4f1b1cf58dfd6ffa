use crate::types::Chain;
use aleph_ccn_entity::chain_cursors::{ActiveModel, Column, Entity, Model};
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, ConnectionTrait, DbErr, EntityTrait};

pub async fn get<C: ConnectionTrait>(db: &C, chain: Chain) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(chain.to_string()).one(db).await
}

/// Single writer per chain, so a plain upsert is enough; it is always
/// called inside the transaction that wrote the corresponding txs.
pub async fn upsert<C: ConnectionTrait>(
    db: &C,
    chain: Chain,
    last_height: u64,
    last_block_hash: Option<String>,
    last_tx_hash: Option<String>,
) -> Result<(), DbErr> {
    Entity::insert(ActiveModel {
        chain: Set(chain.to_string()),
        last_height: Set(last_height as i64),
        last_block_hash: Set(last_block_hash),
        last_tx_hash: Set(last_tx_hash),
        updated_at: Set(Utc::now()),
    })
    .on_conflict(
        OnConflict::column(Column::Chain)
            .update_columns([
                Column::LastHeight,
                Column::LastBlockHash,
                Column::LastTxHash,
                Column::UpdatedAt,
            ])
            .to_owned(),
    )
    .exec(db)
    .await?;
    Ok(())
}
