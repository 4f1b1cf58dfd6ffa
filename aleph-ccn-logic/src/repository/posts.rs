use aleph_ccn_entity::posts::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
};

pub struct NewPost {
    pub item_hash: String,
    pub address: String,
    pub post_type: String,
    pub amends: Option<String>,
    pub channel: Option<String>,
    pub time: f64,
    pub content: serde_json::Value,
}

pub async fn insert<C: ConnectionTrait>(db: &C, post: NewPost) -> Result<bool, DbErr> {
    let inserted = Entity::insert(ActiveModel {
        item_hash: Set(post.item_hash),
        address: Set(post.address),
        post_type: Set(post.post_type),
        amends: Set(post.amends),
        channel: Set(post.channel),
        time: Set(post.time),
        content: Set(post.content),
        visible_content: Set(None),
        visible_time: Set(None),
        visible_item_hash: Set(None),
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

/// The original plus every amendment of it, the candidate set for the
/// visibility rule.
pub async fn revisions<C: ConnectionTrait>(
    db: &C,
    original_hash: &str,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(
            Condition::any()
                .add(Column::ItemHash.eq(original_hash))
                .add(Column::Amends.eq(original_hash)),
        )
        .all(db)
        .await
}

/// Writes the winning revision onto the original row.
pub async fn set_visible<C: ConnectionTrait>(
    db: &C,
    original_hash: &str,
    content: &serde_json::Value,
    time: f64,
    revision_hash: &str,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::VisibleContent, Expr::value(Some(content.clone())))
        .col_expr(Column::VisibleTime, Expr::value(Some(time)))
        .col_expr(
            Column::VisibleItemHash,
            Expr::value(Some(revision_hash.to_string())),
        )
        .filter(Column::ItemHash.eq(original_hash))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(db: &C, item_hash: &str) -> Result<(), DbErr> {
    Entity::delete_by_id(item_hash).exec(db).await?;
    Ok(())
}
