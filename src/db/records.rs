//! Batched idempotent inserts and attachment queries.

use crate::error::StorageError;
use crate::types::{AttachmentStats, MissingAttachment};
use crate::{Error, Result};

use super::{NewRecord, Record, Store};

impl Store {
    /// Insert a batch of records with insert-or-ignore semantics
    ///
    /// Records whose `message_id` already exists are silently skipped —
    /// re-ingestion is a no-op, never an error, never a duplicate row. The
    /// whole call runs in one transaction so readers never observe a partial
    /// batch. Input is chunked to stay within SQLite's bind variable limit
    /// (13 variables per record, max 70 records per INSERT).
    pub async fn batch_insert(&self, source_id: &str, records: &[NewRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        // SQLite default SQLITE_MAX_VARIABLE_NUMBER is 999.
        const MAX_RECORDS_PER_CHUNK: usize = 70;

        let pool = self.pool(source_id).await?;
        let mut tx = pool.begin().await.map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to begin insert transaction: {}",
                e
            )))
        })?;

        for chunk in records.chunks(MAX_RECORDS_PER_CHUNK) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT OR IGNORE INTO messages (message_id, date, sender_id, sender_name, \
                 sender_handle, body, attachment_kind, attachment_path, reply_to_id, \
                 author_signature, view_count, forward_count, reactions) ",
            );

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.message_id)
                    .push_bind(&record.date)
                    .push_bind(record.sender_id)
                    .push_bind(&record.sender_name)
                    .push_bind(&record.sender_handle)
                    .push_bind(&record.body)
                    .push_bind(record.attachment_kind)
                    .push_bind(&record.attachment_path)
                    .push_bind(record.reply_to_id)
                    .push_bind(&record.author_signature)
                    .push_bind(record.view_count)
                    .push_bind(record.forward_count)
                    .push_bind(&record.reactions);
            });

            let query = query_builder.build();
            query.execute(&mut *tx).await.map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "failed to insert record batch: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to commit record batch: {}",
                e
            )))
        })
    }

    /// Record the local path of a downloaded attachment; no-op for absent ids
    pub async fn update_attachment_path(
        &self,
        source_id: &str,
        message_id: i64,
        path: &str,
    ) -> Result<()> {
        let pool = self.pool(source_id).await?;
        sqlx::query("UPDATE messages SET attachment_path = ? WHERE message_id = ?")
            .bind(path)
            .bind(message_id)
            .execute(&pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "failed to update attachment path: {}",
                    e
                )))
            })?;
        Ok(())
    }

    /// Total committed records for a source
    pub async fn count_records(&self, source_id: &str) -> Result<i64> {
        let pool = self.pool(source_id).await?;
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "failed to count records: {}",
                    e
                )))
            })
    }

    /// One committed record by message id
    pub async fn record(&self, source_id: &str, message_id: i64) -> Result<Option<Record>> {
        let pool = self.pool(source_id).await?;
        sqlx::query_as(
            "SELECT message_id, date, sender_id, sender_name, sender_handle, body, \
             attachment_kind, attachment_path, reply_to_id, author_signature, view_count, \
             forward_count, reactions FROM messages WHERE message_id = ?",
        )
        .bind(message_id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to fetch record: {}",
                e
            )))
        })
    }

    /// Records whose attachment should exist locally but does not
    ///
    /// Link previews never count as missing media regardless of path.
    pub async fn missing_attachments(&self, source_id: &str) -> Result<Vec<MissingAttachment>> {
        let pool = self.pool(source_id).await?;
        sqlx::query_as(
            r#"
            SELECT message_id, attachment_kind
            FROM messages
            WHERE attachment_kind IS NOT NULL
              AND attachment_kind != 'webpage'
              AND (attachment_path IS NULL OR attachment_path = '')
            ORDER BY message_id
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to query missing attachments: {}",
                e
            )))
        })
    }

    /// Attachment bookkeeping counters for a source
    pub async fn attachment_stats(&self, source_id: &str) -> Result<AttachmentStats> {
        let pool = self.pool(source_id).await?;

        let with_attachment: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE attachment_kind IS NOT NULL AND attachment_kind != 'webpage'",
        )
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to count attachment records: {}",
                e
            )))
        })?;

        let downloaded: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE attachment_kind IS NOT NULL AND attachment_kind != 'webpage' \
             AND attachment_path IS NOT NULL AND attachment_path != ''",
        )
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "failed to count downloaded attachments: {}",
                e
            )))
        })?;

        Ok(AttachmentStats {
            with_attachment,
            downloaded,
            missing: with_attachment - downloaded,
        })
    }

    /// Highest committed message id, or 0 for an empty store
    pub async fn max_message_id(&self, source_id: &str) -> Result<i64> {
        let pool = self.pool(source_id).await?;
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(message_id) FROM messages")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "failed to query max message id: {}",
                    e
                )))
            })?;
        Ok(max.unwrap_or(0))
    }
}
