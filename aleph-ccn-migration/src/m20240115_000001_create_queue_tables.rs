use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "pending_txs" (
                "id" bigserial PRIMARY KEY,
                "chain" varchar NOT NULL,
                "tx_hash" varchar NOT NULL,
                "height" bigint NOT NULL,
                "tx_index" integer NOT NULL,
                "publisher" varchar NOT NULL,
                "protocol" varchar NOT NULL,
                "content" jsonb,
                "content_ref" varchar,
                "retries" integer NOT NULL DEFAULT 0,
                "next_attempt_at" timestamptz NOT NULL DEFAULT now(),
                "claimed_at" timestamptz,
                "created_at" timestamptz NOT NULL DEFAULT now(),
                CONSTRAINT "uq_pending_txs_chain_tx_hash" UNIQUE ("chain", "tx_hash")
            );

            CREATE INDEX "idx_pending_txs_next_attempt_at" ON "pending_txs" ("next_attempt_at");

            CREATE TABLE "rejected_txs" (
                "id" bigserial PRIMARY KEY,
                "chain" varchar NOT NULL,
                "tx_hash" varchar NOT NULL,
                "reason" text NOT NULL,
                "rejected_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE TABLE "pending_messages" (
                "id" bigserial PRIMARY KEY,
                "item_hash" varchar NOT NULL,
                "sender" varchar NOT NULL,
                "chain" varchar NOT NULL,
                "signature" text,
                "message_type" varchar NOT NULL,
                "channel" varchar,
                "time" double precision NOT NULL,
                "item_type" varchar NOT NULL,
                "item_content" text,
                "origin" varchar NOT NULL,
                "conf_chain" varchar,
                "conf_height" bigint,
                "conf_tx_hash" varchar,
                "check_message" boolean NOT NULL DEFAULT true,
                "retries" integer NOT NULL DEFAULT 0,
                "next_attempt_at" timestamptz NOT NULL DEFAULT now(),
                "claimed_at" timestamptz,
                "created_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE INDEX "idx_pending_messages_claim"
                ON "pending_messages" ("message_type", "next_attempt_at");
            CREATE INDEX "idx_pending_messages_item_hash" ON "pending_messages" ("item_hash");

            CREATE TABLE "rejected_messages" (
                "id" bigserial PRIMARY KEY,
                "item_hash" varchar NOT NULL,
                "message" jsonb NOT NULL,
                "error_code" varchar NOT NULL,
                "reason" text NOT NULL,
                "rejected_at" timestamptz NOT NULL DEFAULT now()
            );

            CREATE TABLE "chain_cursors" (
                "chain" varchar PRIMARY KEY,
                "last_height" bigint NOT NULL,
                "last_block_hash" varchar,
                "last_tx_hash" varchar,
                "updated_at" timestamptz NOT NULL DEFAULT now()
            );

            COMMENT ON TABLE "pending_txs" IS 'On-chain sync transactions awaiting unpacking';

            COMMENT ON TABLE "pending_messages" IS 'Durable ingestion queue; rows are claimed with FOR UPDATE SKIP LOCKED';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "chain_cursors";
            DROP TABLE "rejected_messages";
            DROP TABLE "pending_messages";
            DROP TABLE "rejected_txs";
            DROP TABLE "pending_txs";
        "#;

        crate::from_sql(manager, sql).await
    }
}
