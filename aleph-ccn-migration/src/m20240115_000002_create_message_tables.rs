use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "messages" (
                "item_hash" varchar PRIMARY KEY,
                "sender" varchar NOT NULL,
                "chain" varchar NOT NULL,
                "message_type" varchar NOT NULL,
                "channel" varchar,
                "time" double precision NOT NULL,
                "item_type" varchar NOT NULL,
                "content" jsonb,
                "item_content" text,
                "size" bigint NOT NULL DEFAULT 0,
                "forgotten_by" varchar,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE INDEX "idx_messages_sender" ON "messages" ("sender");

            CREATE TABLE "message_confirmations" (
                "id" bigserial PRIMARY KEY,
                "item_hash" varchar NOT NULL references "messages"("item_hash"),
                "chain" varchar NOT NULL,
                "height" bigint NOT NULL,
                "tx_hash" varchar NOT NULL,
                CONSTRAINT "uq_message_confirmations" UNIQUE ("item_hash", "chain", "tx_hash")
            );

            CREATE TABLE "aggregate_elements" (
                "id" bigserial PRIMARY KEY,
                "item_hash" varchar NOT NULL UNIQUE,
                "address" varchar NOT NULL,
                "key" varchar NOT NULL,
                "time" double precision NOT NULL,
                "content" jsonb NOT NULL
            );

            CREATE INDEX "idx_aggregate_elements_address_key"
                ON "aggregate_elements" ("address", "key", "time");

            CREATE TABLE "aggregates" (
                "address" varchar NOT NULL,
                "key" varchar NOT NULL,
                "content" jsonb NOT NULL,
                "creation_time" double precision NOT NULL,
                "last_revision_time" double precision NOT NULL,
                PRIMARY KEY ("address", "key")
            );

            CREATE TABLE "posts" (
                "item_hash" varchar PRIMARY KEY,
                "address" varchar NOT NULL,
                "post_type" varchar NOT NULL,
                "amends" varchar,
                "channel" varchar,
                "time" double precision NOT NULL,
                "content" jsonb NOT NULL,
                "visible_content" jsonb,
                "visible_time" double precision,
                "visible_item_hash" varchar
            );

            CREATE INDEX "idx_posts_amends" ON "posts" ("amends");

            CREATE TABLE "stored_files" (
                "file_hash" varchar PRIMARY KEY,
                "storage_kind" varchar NOT NULL,
                "size" bigint NOT NULL,
                "pin_count" integer NOT NULL DEFAULT 0,
                "pin_delete_at" timestamptz,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE TABLE "file_pins" (
                "id" bigserial PRIMARY KEY,
                "owner_item_hash" varchar NOT NULL UNIQUE,
                "file_hash" varchar NOT NULL references "stored_files"("file_hash"),
                "address" varchar NOT NULL,
                "size" bigint NOT NULL,
                "temporary" boolean NOT NULL DEFAULT false,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE INDEX "idx_file_pins_address" ON "file_pins" ("address");

            COMMENT ON TABLE "messages" IS 'Confirmed messages; content is nulled on FORGET, the row stays as a tombstone';

            COMMENT ON TABLE "aggregates" IS 'Materialized deep-merge fold of aggregate_elements per (address, key)';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "file_pins";
            DROP TABLE "stored_files";
            DROP TABLE "posts";
            DROP TABLE "aggregates";
            DROP TABLE "aggregate_elements";
            DROP TABLE "message_confirmations";
            DROP TABLE "messages";
        "#;

        crate::from_sql(manager, sql).await
    }
}
