use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "programs" (
                "item_hash" varchar PRIMARY KEY,
                "owner" varchar NOT NULL,
                "http_trigger" boolean NOT NULL DEFAULT false,
                "cron_schedule" varchar,
                "message_filters" jsonb,
                "descriptor" jsonb NOT NULL,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE INDEX "idx_programs_owner" ON "programs" ("owner");

            CREATE TABLE "balances" (
                "address" varchar NOT NULL,
                "chain" varchar NOT NULL,
                "token" varchar NOT NULL,
                "amount" double precision NOT NULL,
                "last_height" bigint NOT NULL DEFAULT 0,
                "updated_at" timestamptz NOT NULL DEFAULT now(),
                PRIMARY KEY ("address", "chain", "token")
            );

            COMMENT ON TABLE "programs" IS 'Program descriptors indexed by trigger; execution lives outside this node';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "balances";
            DROP TABLE "programs";
        "#;

        crate::from_sql(manager, sql).await
    }
}
