use aleph_ccn_entity::{
    file_pins,
    stored_files::{ActiveModel, Column, Entity, Model},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, LockType, OnConflict},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// Row-level lock on the file. STORE/FORGET handlers and the GC all go
/// through this before touching `pin_count`.
pub async fn lock<C: ConnectionTrait>(db: &C, file_hash: &str) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(file_hash)
        .lock(LockType::Update)
        .one(db)
        .await
}

pub async fn insert<C: ConnectionTrait>(
    db: &C,
    file_hash: &str,
    storage_kind: &str,
    size: u64,
) -> Result<(), DbErr> {
    let now = Utc::now();
    Entity::insert(ActiveModel {
        file_hash: Set(file_hash.to_string()),
        storage_kind: Set(storage_kind.to_string()),
        size: Set(size as i64),
        pin_count: Set(0),
        pin_delete_at: Set(None),
        accessed_at: Set(now),
        created_at: Set(now),
    })
    .on_conflict(OnConflict::column(Column::FileHash).do_nothing().to_owned())
    .exec_without_returning(db)
    .await?;
    Ok(())
}

pub async fn set_pin_state<C: ConnectionTrait>(
    db: &C,
    file_hash: &str,
    pin_count: i32,
    pin_delete_at: Option<DateTime<Utc>>,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::PinCount, Expr::value(pin_count))
        .col_expr(Column::PinDeleteAt, Expr::value(pin_delete_at))
        .col_expr(Column::AccessedAt, Expr::value(Utc::now()))
        .filter(Column::FileHash.eq(file_hash))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn delete<C: ConnectionTrait>(db: &C, file_hash: &str) -> Result<(), DbErr> {
    Entity::delete_by_id(file_hash).exec(db).await?;
    Ok(())
}

/// Unpinned files whose scheduled deletion is due. Both conditions are
/// re-checked under the row lock before anything is deleted.
pub async fn gc_candidates<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::PinCount.eq(0))
        .filter(Column::PinDeleteAt.lte(Utc::now()))
        .all(db)
        .await
}

/// Drops the pin rows of a file being collected.
pub async fn delete_pins_for_file<C: ConnectionTrait>(db: &C, file_hash: &str) -> Result<(), DbErr> {
    file_pins::Entity::delete_many()
        .filter(file_pins::Column::FileHash.eq(file_hash))
        .exec(db)
        .await?;
    Ok(())
}

/// Pinned files of one address, least recently accessed first. The
/// balance reconciler walks this to pick overage victims.
pub async fn lru_for_address<C: ConnectionTrait>(
    db: &C,
    address: &str,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .join_rev(
            sea_orm::JoinType::InnerJoin,
            file_pins::Entity::belongs_to(Entity)
                .from(file_pins::Column::FileHash)
                .to(Column::FileHash)
                .into(),
        )
        .filter(file_pins::Column::Address.eq(address))
        .filter(Column::PinDeleteAt.is_null())
        .order_by_asc(Column::AccessedAt)
        .all(db)
        .await
}

pub async fn schedule_delete<C: ConnectionTrait>(
    db: &C,
    file_hash: &str,
    at: DateTime<Utc>,
) -> Result<(), DbErr> {
    Entity::update_many()
        .col_expr(Column::PinDeleteAt, Expr::value(Some(at)))
        .filter(Column::FileHash.eq(file_hash))
        .exec(db)
        .await?;
    Ok(())
}

pub mod pins {
    use super::*;

    pub async fn add<C: ConnectionTrait>(
        db: &C,
        owner_item_hash: &str,
        file_hash: &str,
        address: &str,
        size: u64,
        temporary: bool,
    ) -> Result<bool, DbErr> {
        let inserted = file_pins::Entity::insert(file_pins::ActiveModel {
            owner_item_hash: Set(owner_item_hash.to_string()),
            file_hash: Set(file_hash.to_string()),
            address: Set(address.to_string()),
            size: Set(size as i64),
            temporary: Set(temporary),
            created_at: Set(Utc::now()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(file_pins::Column::OwnerItemHash)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
        Ok(inserted > 0)
    }

    /// Releases every pin one address holds on a file. Used by the
    /// balance reconciler to evict overage victims without touching
    /// other addresses' pins on the same content.
    pub async fn remove_for_address<C: ConnectionTrait>(
        db: &C,
        file_hash: &str,
        address: &str,
    ) -> Result<Vec<file_pins::Model>, DbErr> {
        let pins = file_pins::Entity::find()
            .filter(file_pins::Column::FileHash.eq(file_hash))
            .filter(file_pins::Column::Address.eq(address))
            .all(db)
            .await?;
        if !pins.is_empty() {
            file_pins::Entity::delete_many()
                .filter(file_pins::Column::FileHash.eq(file_hash))
                .filter(file_pins::Column::Address.eq(address))
                .exec(db)
                .await?;
        }
        Ok(pins)
    }

    pub async fn remove<C: ConnectionTrait>(
        db: &C,
        owner_item_hash: &str,
    ) -> Result<Option<file_pins::Model>, DbErr> {
        let pin = file_pins::Entity::find()
            .filter(file_pins::Column::OwnerItemHash.eq(owner_item_hash))
            .one(db)
            .await?;
        if let Some(pin) = &pin {
            file_pins::Entity::delete_by_id(pin.id).exec(db).await?;
        }
        Ok(pin)
    }

    pub async fn get<C: ConnectionTrait>(
        db: &C,
        owner_item_hash: &str,
    ) -> Result<Option<file_pins::Model>, DbErr> {
        file_pins::Entity::find()
            .filter(file_pins::Column::OwnerItemHash.eq(owner_item_hash))
            .one(db)
            .await
    }

    /// Total pinned bytes per address, for usage accounting.
    pub async fn usage_by_address<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<(String, i64)>, DbErr> {
        #[derive(sea_orm::FromQueryResult)]
        struct Usage {
            address: String,
            total: i64,
        }

        // SUM(bigint) is numeric in postgres, cast it back
        let rows = file_pins::Entity::find()
            .select_only()
            .column(file_pins::Column::Address)
            .column_as(Expr::cust("SUM(size)::bigint"), "total")
            .group_by(file_pins::Column::Address)
            .into_model::<Usage>()
            .all(db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.address, row.total)).collect())
    }
}
