use crate::types::Chain;
use aleph_ccn_entity::balances::{Column, Entity};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait,
    FromQueryResult, QueryFilter, QuerySelect, Statement,
};

/// Applies a signed balance delta observed at `height`. The height guard
/// makes replays of already-seen transfer logs no-ops.
pub async fn apply_delta<C: ConnectionTrait>(
    db: &C,
    address: &str,
    chain: Chain,
    token: &str,
    delta: f64,
    height: u64,
) -> Result<(), DbErr> {
    let sql = r#"
        INSERT INTO balances (address, chain, token, amount, last_height, updated_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (address, chain, token) DO UPDATE
        SET amount = balances.amount + EXCLUDED.amount,
            last_height = EXCLUDED.last_height,
            updated_at = now()
        WHERE balances.last_height < EXCLUDED.last_height;
    "#;
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        sql,
        [
            address.into(),
            chain.as_str().into(),
            token.into(),
            delta.into(),
            (height as i64).into(),
        ],
    ))
    .await?;
    Ok(())
}

/// Total holdings of an address across chains and tokens, in whole
/// tokens. Used to derive the storage allowance.
pub async fn total_for_address<C: ConnectionTrait>(db: &C, address: &str) -> Result<f64, DbErr> {
    #[derive(FromQueryResult)]
    struct Total {
        total: Option<f64>,
    }

    let row = Entity::find()
        .select_only()
        .column_as(Expr::cust("SUM(amount)"), "total")
        .filter(Column::Address.eq(address))
        .into_model::<Total>()
        .one(db)
        .await?;
    Ok(row.and_then(|r| r.total).unwrap_or(0.0))
}
