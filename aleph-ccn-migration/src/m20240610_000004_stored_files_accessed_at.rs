use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            ALTER TABLE "stored_files"
                ADD COLUMN "accessed_at" timestamptz NOT NULL DEFAULT now();

            CREATE INDEX "idx_stored_files_gc"
                ON "stored_files" ("pin_delete_at") WHERE "pin_count" = 0;
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP INDEX "idx_stored_files_gc";
            ALTER TABLE "stored_files" DROP COLUMN "accessed_at";
        "#;

        crate::from_sql(manager, sql).await
    }
}
