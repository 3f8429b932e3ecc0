//! Pool registry, schema creation, and additive migrations.

use crate::error::StorageError;
use crate::{Error, Result};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::collections::HashSet;
use std::str::FromStr;

use super::Store;

impl Store {
    /// Open (or create) the database for a source
    ///
    /// Idempotent and safe to call repeatedly or concurrently: the registry
    /// is checked under a lock and an existing pool is reused. Creates the
    /// on-disk structure, the required indexes, and applies additive column
    /// migrations so a database written by an older schema upgrades
    /// transparently without data loss.
    pub async fn open_or_create(&self, source_id: &str) -> Result<()> {
        self.pool(source_id).await.map(|_| ())
    }

    /// Close every registered pool and clear the registry
    ///
    /// Subsequent operations reopen databases on demand.
    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (source_id, pool) in pools.drain() {
            tracing::debug!(source = %source_id, "closing database pool");
            pool.close().await;
        }
    }

    /// Pool for a source, opening and migrating the database on first use
    pub(super) async fn pool(&self, source_id: &str) -> Result<SqlitePool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(source_id) {
            return Ok(pool.clone());
        }

        let pool = self.connect(source_id).await?;
        Self::migrate(&pool).await?;
        pools.insert(source_id.to_string(), pool.clone());
        Ok(pool)
    }

    async fn connect(&self, source_id: &str) -> Result<SqlitePool> {
        let dir = self.source_dir(source_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(StorageError::ConnectionFailed(format!(
                "failed to create source directory {}: {}",
                dir.display(),
                e
            )))
        })?;

        let db_path = dir.join(format!("{source_id}.db"));
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| {
                Error::Storage(StorageError::ConnectionFailed(format!(
                    "failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Storage(StorageError::ConnectionFailed(format!(
                "failed to connect to database: {}",
                e
            )))
        })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL UNIQUE,
                date TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                sender_name TEXT,
                sender_handle TEXT,
                body TEXT NOT NULL,
                attachment_kind TEXT,
                attachment_path TEXT,
                reply_to_id INTEGER,
                author_signature TEXT,
                view_count INTEGER,
                forward_count INTEGER,
                reactions TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::MigrationFailed(format!(
                "failed to create messages table: {}",
                e
            )))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)")
            .execute(pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::MigrationFailed(format!(
                    "failed to create index: {}",
                    e
                )))
            })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date)")
            .execute(pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::MigrationFailed(format!(
                    "failed to create index: {}",
                    e
                )))
            })?;

        Self::apply_additive_columns(pool).await
    }

    /// Additive-only schema evolution
    ///
    /// A database created by an older release may be missing the newer
    /// optional columns; inspect the live shape and add whatever is absent.
    async fn apply_additive_columns(pool: &SqlitePool) -> Result<()> {
        let rows = sqlx::query("PRAGMA table_info(messages)")
            .fetch_all(pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::MigrationFailed(format!(
                    "failed to inspect messages schema: {}",
                    e
                )))
            })?;

        let existing: HashSet<String> = rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect();

        const ADDITIVE: [(&str, &str); 4] = [
            ("author_signature", "TEXT"),
            ("view_count", "INTEGER"),
            ("forward_count", "INTEGER"),
            ("reactions", "TEXT"),
        ];

        for (column, column_type) in ADDITIVE {
            if existing.contains(column) {
                continue;
            }
            tracing::info!(column, "adding missing column to messages table");
            sqlx::query(&format!(
                "ALTER TABLE messages ADD COLUMN {column} {column_type}"
            ))
            .execute(pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::MigrationFailed(format!(
                    "failed to add column {}: {}",
                    column, e
                )))
            })?;
        }

        Ok(())
    }
}
