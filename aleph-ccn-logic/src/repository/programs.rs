use aleph_ccn_entity::programs::{ActiveModel, Column, Entity};
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, ConnectionTrait, DbErr, EntityTrait};

pub struct NewProgram {
    pub item_hash: String,
    pub owner: String,
    pub http_trigger: bool,
    pub cron_schedule: Option<String>,
    pub message_filters: Option<serde_json::Value>,
    pub descriptor: serde_json::Value,
}

pub async fn insert<C: ConnectionTrait>(db: &C, program: NewProgram) -> Result<(), DbErr> {
    Entity::insert(ActiveModel {
        item_hash: Set(program.item_hash),
        owner: Set(program.owner),
        http_trigger: Set(program.http_trigger),
        cron_schedule: Set(program.cron_schedule),
        message_filters: Set(program.message_filters),
        descriptor: Set(program.descriptor),
        created_at: Set(Utc::now()),
    })
    .on_conflict(OnConflict::column(Column::ItemHash).do_nothing().to_owned())
    .exec_without_returning(db)
    .await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<(), DbErr> {
    Entity::delete_by_id(item_hash).exec(db).await?;
    Ok(())
}
