pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{Statement, TransactionTrait};

mod m20240115_000001_create_queue_tables;
mod m20240115_000002_create_message_tables;
mod m20240301_000003_programs_and_balances;
mod m20240610_000004_stored_files_accessed_at;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240115_000001_create_queue_tables::Migration),
            Box::new(m20240115_000002_create_message_tables::Migration),
            Box::new(m20240301_000003_programs_and_balances::Migration),
            Box::new(m20240610_000004_stored_files_accessed_at::Migration),
        ]
    }
}

pub async fn from_sql(manager: &SchemaManager<'_>, content: &str) -> Result<(), DbErr> {
    let stmnts: Vec<&str> = content.split(';').collect();
    let txn = manager.get_connection().begin().await?;
    for st in stmnts.into_iter() {
        txn.execute(Statement::from_string(
            manager.get_database_backend(),
            st.to_string(),
        ))
        .await
        .map_err(|e| DbErr::Migration(format!("{e}\nQuery: {st}")))?;
    }
    txn.commit().await
}
