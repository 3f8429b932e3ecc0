//! Store tests: idempotent ingestion, schema evolution, attachment queries.

use super::*;
use crate::types::{AttachmentKind, AttachmentStats};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

fn record(message_id: i64) -> NewRecord {
    NewRecord {
        message_id,
        date: "2024-01-01 00:00:00".to_string(),
        sender_id: 0,
        sender_name: None,
        sender_handle: None,
        body: format!("message {message_id}"),
        attachment_kind: None,
        attachment_path: None,
        reply_to_id: None,
        author_signature: None,
        view_count: None,
        forward_count: None,
        reactions: None,
    }
}

fn record_with_kind(message_id: i64, kind: AttachmentKind) -> NewRecord {
    NewRecord {
        attachment_kind: Some(kind),
        ..record(message_id)
    }
}

#[tokio::test]
async fn open_or_create_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());

    store.open_or_create("chan").await.unwrap();
    store.open_or_create("chan").await.unwrap();

    assert_eq!(store.count_records("chan").await.unwrap(), 0);
    assert!(dir.path().join("chan").join("chan.db").exists());
}

#[tokio::test]
async fn batch_insert_skips_existing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.open_or_create("chan").await.unwrap();

    let first: Vec<_> = (1..=10).map(record).collect();
    store.batch_insert("chan", &first).await.unwrap();

    // Overlapping re-ingestion: ids 5..=15, of which 5..=10 already exist
    let overlap: Vec<_> = (5..=15).map(record).collect();
    store.batch_insert("chan", &overlap).await.unwrap();

    assert_eq!(store.count_records("chan").await.unwrap(), 15);

    // The original row survived, not the re-ingested one
    let row = store.record("chan", 5).await.unwrap().unwrap();
    assert_eq!(row.body, "message 5");
}

#[tokio::test]
async fn batch_insert_handles_more_than_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());

    // 150 records exceeds the 70-record chunk size twice over
    let records: Vec<_> = (1..=150).map(record).collect();
    store.batch_insert("chan", &records).await.unwrap();
    assert_eq!(store.count_records("chan").await.unwrap(), 150);
    assert_eq!(store.max_message_id("chan").await.unwrap(), 150);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.batch_insert("chan", &[]).await.unwrap();
    assert_eq!(store.count_records("chan").await.unwrap(), 0);
}

#[tokio::test]
async fn update_attachment_path_is_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    let records = vec![
        record_with_kind(1, AttachmentKind::Photo),
        record_with_kind(2, AttachmentKind::Photo),
    ];
    store.batch_insert("chan", &records).await.unwrap();

    store
        .update_attachment_path("chan", 1, "media/1-photo.jpg")
        .await
        .unwrap();

    let one = store.record("chan", 1).await.unwrap().unwrap();
    let two = store.record("chan", 2).await.unwrap().unwrap();
    assert_eq!(one.attachment_path.as_deref(), Some("media/1-photo.jpg"));
    assert_eq!(two.attachment_path, None);

    // Absent id is a no-op, not an error
    store
        .update_attachment_path("chan", 999, "media/ghost")
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_attachments_excludes_link_previews() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    let records = vec![
        record_with_kind(1, AttachmentKind::Photo),    // missing
        record_with_kind(2, AttachmentKind::Webpage),  // never missing
        record_with_kind(3, AttachmentKind::Document), // downloaded below
        record(4),                                     // no attachment at all
    ];
    store.batch_insert("chan", &records).await.unwrap();
    store
        .update_attachment_path("chan", 3, "media/3-file.bin")
        .await
        .unwrap();

    let missing = store.missing_attachments("chan").await.unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].message_id, 1);
    assert_eq!(missing[0].attachment_kind, AttachmentKind::Photo);
}

#[tokio::test]
async fn attachment_stats_count_downloadable_kinds_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    let records = vec![
        record_with_kind(1, AttachmentKind::Photo),
        record_with_kind(2, AttachmentKind::Document),
        record_with_kind(3, AttachmentKind::Webpage),
        record(4),
    ];
    store.batch_insert("chan", &records).await.unwrap();
    store
        .update_attachment_path("chan", 1, "media/1-photo.jpg")
        .await
        .unwrap();

    let stats = store.attachment_stats("chan").await.unwrap();
    assert_eq!(
        stats,
        AttachmentStats {
            with_attachment: 2,
            downloaded: 1,
            missing: 1,
        }
    );
}

#[tokio::test]
async fn sources_get_independent_databases() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.batch_insert("alpha", &[record(1)]).await.unwrap();
    store
        .batch_insert("beta", &[record(1), record(2)])
        .await
        .unwrap();

    assert_eq!(store.count_records("alpha").await.unwrap(), 1);
    assert_eq!(store.count_records("beta").await.unwrap(), 2);
}

#[tokio::test]
async fn close_all_allows_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    store.batch_insert("chan", &[record(1)]).await.unwrap();

    store.close_all().await;

    // Operations after close_all reopen on demand
    assert_eq!(store.count_records("chan").await.unwrap(), 1);
}

#[tokio::test]
async fn reopening_old_schema_upgrades_additively() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path().join("chan");
    tokio::fs::create_dir_all(&source_dir).await.unwrap();
    let db_path = source_dir.join("chan.db");

    // Simulate a database written before the counters/reactions columns
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
    sqlx::query(
        r#"
        CREATE TABLE messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL UNIQUE,
            date TEXT NOT NULL,
            sender_id INTEGER NOT NULL,
            sender_name TEXT,
            sender_handle TEXT,
            body TEXT NOT NULL,
            attachment_kind TEXT,
            attachment_path TEXT,
            reply_to_id INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO messages (message_id, date, sender_id, body) \
         VALUES (1, '2023-06-01 12:00:00', 0, 'old row')",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let store = Store::new(dir.path());
    store.open_or_create("chan").await.unwrap();

    // Old data survives and the evolved columns are usable
    let old = store.record("chan", 1).await.unwrap().unwrap();
    assert_eq!(old.body, "old row");
    assert_eq!(old.reactions, None);

    let mut new = record(2);
    new.reactions = Some("👍 3".to_string());
    new.view_count = Some(40);
    store.batch_insert("chan", &[new]).await.unwrap();

    let row = store.record("chan", 2).await.unwrap().unwrap();
    assert_eq!(row.reactions.as_deref(), Some("👍 3"));
    assert_eq!(row.view_count, Some(40));
}
