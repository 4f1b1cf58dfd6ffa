//! End-to-end pipeline tests against a real postgres. Run them with a
//! `DATABASE_URL` pointing at a disposable instance:
//! `cargo test -- --ignored`

use crate::{
    pipeline::MessagePipeline,
    repository::{messages, pending_messages},
    settings::{PipelineSettings, StorageSettings},
    storage::{self, Storage},
    types::{sha256_hex, Chain, Confirmation, ItemType, MessageEnvelope, MessageType, Origin},
};
use aleph_ccn_entity::{aggregate_elements, aggregates, message_confirmations, rejected_messages, stored_files};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use std::{sync::Arc, time::Duration};

use super::init_db;

fn test_storage() -> (tempfile::TempDir, Arc<Storage>, StorageSettings) {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings {
        root: dir.path().to_path_buf(),
        ..Default::default()
    };
    let storage = Arc::new(Storage::new(&settings).unwrap());
    (dir, storage, settings)
}

fn pipeline(db: &DatabaseConnection, storage: Arc<Storage>, settings: StorageSettings) -> MessagePipeline {
    MessagePipeline::new(
        db.clone(),
        storage,
        None,
        PipelineSettings::default(),
        settings,
    )
}

fn inline_envelope(
    sender: &str,
    message_type: MessageType,
    content: &serde_json::Value,
) -> MessageEnvelope {
    let raw = content.to_string();
    MessageEnvelope {
        chain: Chain::Eth,
        sender: sender.to_string(),
        message_type,
        channel: Some("TEST".to_string()),
        time: content["time"].as_f64().unwrap_or(0.0),
        item_type: ItemType::Inline,
        item_hash: sha256_hex(raw.as_bytes()).parse().unwrap(),
        item_content: Some(raw),
        signature: None,
    }
}

async fn drain(pipeline: &MessagePipeline, db: &DatabaseConnection, message_type: MessageType) {
    loop {
        let batch =
            pending_messages::claim_batch(db, message_type, 16, Duration::from_secs(300))
                .await
                .unwrap();
        if batch.is_empty() {
            return;
        }
        for row in batch {
            pipeline.process_row(row).await;
        }
    }
}

#[tokio::test]
#[ignore = "requires a postgres instance"]
async fn cross_source_dedup_merges_confirmations() {
    let db = init_db("pipeline_dedup").await;
    let (_dir, storage, storage_settings) = test_storage();
    let pipeline = pipeline(db.client().as_ref(), storage, storage_settings);

    let content = json!({"address": "0xA", "key": "profile", "time": 100.0, "content": {"name": "x"}});
    let envelope = inline_envelope("0xA", MessageType::Aggregate, &content);

    // same envelope from p2p first, then on-chain
    pending_messages::insert(db.client().as_ref(), &envelope, Origin::P2p, None, false)
        .await
        .unwrap();
    drain(&pipeline, db.client().as_ref(), MessageType::Aggregate).await;

    let confirmation = Confirmation {
        chain: Chain::Eth,
        height: 1000,
        tx_hash: "0xdeadbeef".to_string(),
    };
    pending_messages::insert(
        db.client().as_ref(),
        &envelope,
        Origin::Onchain,
        Some(&confirmation),
        false,
    )
    .await
    .unwrap();
    drain(&pipeline, db.client().as_ref(), MessageType::Aggregate).await;

    assert_eq!(messages::count(db.client().as_ref()).await.unwrap(), 1);
    let confirmations = message_confirmations::Entity::find()
        .all(db.client().as_ref())
        .await
        .unwrap();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].height, 1000);

    // the handler ran exactly once
    assert_eq!(
        aggregate_elements::Entity::find()
            .count(db.client().as_ref())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
#[ignore = "requires a postgres instance"]
async fn aggregate_fold_round_trip() {
    let db = init_db("pipeline_aggregate_fold").await;
    let (_dir, storage, storage_settings) = test_storage();
    let pipeline = pipeline(db.client().as_ref(), storage, storage_settings);

    for content in [
        json!({"address": "0xA", "key": "profile", "time": 100.0, "content": {"name": "x"}}),
        json!({"address": "0xA", "key": "profile", "time": 200.0, "content": {"name": "y", "age": 3}}),
        json!({"address": "0xA", "key": "profile", "time": 150.0, "content": {"age": null}}),
    ] {
        let envelope = inline_envelope("0xA", MessageType::Aggregate, &content);
        pending_messages::insert(db.client().as_ref(), &envelope, Origin::Http, None, false)
            .await
            .unwrap();
        drain(&pipeline, db.client().as_ref(), MessageType::Aggregate).await;
    }

    let view = aggregates::Entity::find_by_id(("0xA".to_string(), "profile".to_string()))
        .one(db.client().as_ref())
        .await
        .unwrap()
        .unwrap();
    // the null at t=150 removed `age`, but the t=200 write re-asserts it
    assert_eq!(view.content, json!({"name": "y", "age": 3}));
}

#[tokio::test]
#[ignore = "requires a postgres instance"]
async fn store_then_forget_releases_the_pin() {
    let db = init_db("pipeline_store_forget").await;
    let (_dir, storage, storage_settings) = test_storage();
    let pipeline = pipeline(db.client().as_ref(), storage.clone(), storage_settings);

    let file_hash = storage.put(b"file bytes").await.unwrap();
    let store_content = json!({
        "address": "0xA",
        "time": 100.0,
        "item_type": "storage",
        "item_hash": file_hash,
    });
    let store_envelope = inline_envelope("0xA", MessageType::Store, &store_content);
    pending_messages::insert(db.client().as_ref(), &store_envelope, Origin::Http, None, false)
        .await
        .unwrap();
    drain(&pipeline, db.client().as_ref(), MessageType::Store).await;

    let file = stored_files::Entity::find_by_id(file_hash.clone())
        .one(db.client().as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.pin_count, 1);
    assert!(file.pin_delete_at.is_none());

    let forget_content = json!({
        "address": "0xA",
        "time": 200.0,
        "hashes": [store_envelope.item_hash.as_str()],
        "reason": "cleanup",
    });
    let forget_envelope = inline_envelope("0xA", MessageType::Forget, &forget_content);
    pending_messages::insert(db.client().as_ref(), &forget_envelope, Origin::Http, None, false)
        .await
        .unwrap();
    drain(&pipeline, db.client().as_ref(), MessageType::Forget).await;

    let file = stored_files::Entity::find_by_id(file_hash.clone())
        .one(db.client().as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.pin_count, 0);
    assert!(file.pin_delete_at.is_some());

    let target = messages::get(db.client().as_ref(), store_envelope.item_hash.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        target.forgotten_by.as_deref(),
        Some(forget_envelope.item_hash.as_str())
    );
    assert!(target.content.is_none());

    // force the grace period to expire, then collect
    crate::repository::stored_files::schedule_delete(
        db.client().as_ref(),
        &file_hash,
        chrono::Utc::now() - chrono::Duration::hours(1),
    )
    .await
    .unwrap();
    let removed = storage::gc::collect(db.client().as_ref(), &storage).await.unwrap();
    assert_eq!(removed, 1);
    assert!(stored_files::Entity::find_by_id(file_hash.clone())
        .one(db.client().as_ref())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires a postgres instance"]
async fn unauthorized_delegation_is_rejected() {
    let db = init_db("pipeline_unauthorized").await;
    let (_dir, storage, storage_settings) = test_storage();
    let pipeline = pipeline(db.client().as_ref(), storage, storage_settings);

    // 0xB acts for 0xA with no delegation in 0xA's security aggregate
    let content = json!({"address": "0xA", "key": "profile", "time": 100.0, "content": {"name": "evil"}});
    let envelope = inline_envelope("0xB", MessageType::Aggregate, &content);
    pending_messages::insert(db.client().as_ref(), &envelope, Origin::Http, None, false)
        .await
        .unwrap();
    drain(&pipeline, db.client().as_ref(), MessageType::Aggregate).await;

    assert_eq!(messages::count(db.client().as_ref()).await.unwrap(), 0);
    assert_eq!(
        aggregates::Entity::find()
            .count(db.client().as_ref())
            .await
            .unwrap(),
        0
    );
    let rejected = rejected_messages::Entity::find()
        .filter(rejected_messages::Column::ErrorCode.eq("unauthorized"))
        .all(db.client().as_ref())
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
#[ignore = "requires a postgres instance"]
async fn claimed_rows_are_invisible_until_the_claim_expires() {
    let db = init_db("pipeline_claim").await;

    let content = json!({"address": "0xA", "key": "k", "time": 1.0, "content": {}});
    let envelope = inline_envelope("0xA", MessageType::Aggregate, &content);
    pending_messages::insert(db.client().as_ref(), &envelope, Origin::Http, None, false)
        .await
        .unwrap();

    let first = pending_messages::claim_batch(
        db.client().as_ref(),
        MessageType::Aggregate,
        16,
        Duration::from_secs(300),
    )
    .await
    .unwrap();
    assert_eq!(first.len(), 1);

    // still claimed
    let second = pending_messages::claim_batch(
        db.client().as_ref(),
        MessageType::Aggregate,
        16,
        Duration::from_secs(300),
    )
    .await
    .unwrap();
    assert!(second.is_empty());

    // a zero claim timeout makes the abandoned row immediately reclaimable
    let third = pending_messages::claim_batch(
        db.client().as_ref(),
        MessageType::Aggregate,
        16,
        Duration::ZERO,
    )
    .await
    .unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].id, first[0].id);
}
