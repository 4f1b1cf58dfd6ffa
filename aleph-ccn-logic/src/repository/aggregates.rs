use aleph_ccn_entity::{
    aggregate_elements,
    aggregates::{ActiveModel, Column, Entity, Model},
};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};

/// Stores the raw element for replay. Returns `false` if this element
/// (by `item_hash`) was already recorded.
pub async fn insert_element<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
    address: &str,
    key: &str,
    time: f64,
    content: &serde_json::Value,
) -> Result<bool, DbErr> {
    let inserted = aggregate_elements::Entity::insert(aggregate_elements::ActiveModel {
        item_hash: Set(item_hash.to_string()),
        address: Set(address.to_string()),
        key: Set(key.to_string()),
        time: Set(time),
        content: Set(content.clone()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(aggregate_elements::Column::ItemHash)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;
    Ok(inserted > 0)
}

/// All elements of one aggregate in fold order: ascending content time,
/// ties broken by item hash.
pub async fn elements<C: ConnectionTrait>(
    db: &C,
    address: &str,
    key: &str,
) -> Result<Vec<aggregate_elements::Model>, DbErr> {
    aggregate_elements::Entity::find()
        .filter(aggregate_elements::Column::Address.eq(address))
        .filter(aggregate_elements::Column::Key.eq(key))
        .order_by_asc(aggregate_elements::Column::Time)
        .order_by_asc(aggregate_elements::Column::ItemHash)
        .all(db)
        .await
}

pub async fn delete_element<C: ConnectionTrait>(
    db: &C,
    item_hash: &str,
) -> Result<Option<aggregate_elements::Model>, DbErr> {
    let element = aggregate_elements::Entity::find()
        .filter(aggregate_elements::Column::ItemHash.eq(item_hash))
        .one(db)
        .await?;
    if let Some(element) = &element {
        aggregate_elements::Entity::delete_by_id(element.id)
            .exec(db)
            .await?;
    }
    Ok(element)
}

pub async fn delete_elements<C: ConnectionTrait>(
    db: &C,
    address: &str,
    key: &str,
) -> Result<(), DbErr> {
    aggregate_elements::Entity::delete_many()
        .filter(aggregate_elements::Column::Address.eq(address))
        .filter(aggregate_elements::Column::Key.eq(key))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn get_view<C: ConnectionTrait>(
    db: &C,
    address: &str,
    key: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id((address.to_string(), key.to_string()))
        .one(db)
        .await
}

pub async fn upsert_view<C: ConnectionTrait>(
    db: &C,
    address: &str,
    key: &str,
    content: &serde_json::Value,
    creation_time: f64,
    last_revision_time: f64,
) -> Result<(), DbErr> {
    Entity::insert(ActiveModel {
        address: Set(address.to_string()),
        key: Set(key.to_string()),
        content: Set(content.clone()),
        creation_time: Set(creation_time),
        last_revision_time: Set(last_revision_time),
    })
    .on_conflict(
        OnConflict::columns([Column::Address, Column::Key])
            .update_columns([Column::Content, Column::CreationTime, Column::LastRevisionTime])
            .to_owned(),
    )
    .exec(db)
    .await?;
    Ok(())
}

pub async fn delete_view<C: ConnectionTrait>(db: &C, address: &str, key: &str) -> Result<(), DbErr> {
    Entity::delete_by_id((address.to_string(), key.to_string()))
        .exec(db)
        .await?;
    Ok(())
}
