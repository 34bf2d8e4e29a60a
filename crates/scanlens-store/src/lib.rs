//! scanlens-store — Scan-history persistence.
//!
//! One SQLite table of scan records, written by the application layer after
//! a scan completes. The recognition core never writes here; it only hands
//! its results to whoever owns a store handle.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One persisted scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub user_id: String,
    /// Where the scanned image lives (file path or URL); the store does not
    /// interpret it.
    pub image_ref: String,
    pub label: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed scan history.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the history database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS scan_history (
                        id          TEXT PRIMARY KEY,
                        user_id     TEXT NOT NULL,
                        image_ref   TEXT NOT NULL,
                        label       TEXT NOT NULL,
                        confidence  REAL NOT NULL,
                        created_at  TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_scan_history_user
                        ON scan_history (user_id, created_at DESC);",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Persist one scan result, returning the new record id.
    pub async fn save_record(
        &self,
        user_id: &str,
        image_ref: &str,
        label: &str,
        confidence: f32,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record_id = id.clone();
        let user_id = user_id.to_string();
        let image_ref = image_ref.to_string();
        let label = label.to_string();
        let created_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO scan_history
                        (id, user_id, image_ref, label, confidence, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![id, user_id, image_ref, label, confidence, created_at],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(id = %record_id, "scan record saved");
        Ok(record_id)
    }

    /// All records for a user, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ScanRecord>, StoreError> {
        let user_id = user_id.to_string();
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, image_ref, label, confidence, created_at
                     FROM scan_history
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map([user_id], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(records)
    }

    /// Remove one record by id. Returns whether a row was deleted.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM scan_history WHERE id = ?1", [id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Remove every record for a user. Returns the number deleted.
    pub async fn clear_user(&self, user_id: &str) -> Result<usize, StoreError> {
        let user_id = user_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM scan_history WHERE user_id = ?1", [user_id])?;
                Ok(n)
            })
            .await?;
        Ok(deleted)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRecord> {
    let created_raw: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
        })?;
    Ok(ScanRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        image_ref: row.get(2)?,
        label: row.get(3)?,
        confidence: row.get(4)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_list_round_trip() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let id = store
            .save_record("alice", "/tmp/cup.jpg", "coffee mug", 0.82)
            .await
            .unwrap();

        let records = store.list_for_user("alice").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].label, "coffee mug");
        assert!((records[0].confidence - 0.82).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.save_record("u", "a.jpg", "first", 0.5).await.unwrap();
        store.save_record("u", "b.jpg", "second", 0.5).await.unwrap();
        store.save_record("u", "c.jpg", "third", 0.5).await.unwrap();

        let records = store.list_for_user("u").await.unwrap();
        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.save_record("alice", "a.jpg", "cat", 0.9).await.unwrap();
        store.save_record("bob", "b.jpg", "dog", 0.9).await.unwrap();

        assert_eq!(store.list_for_user("alice").await.unwrap().len(), 1);
        assert_eq!(store.list_for_user("bob").await.unwrap().len(), 1);
        assert!(store.list_for_user("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_record() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let id = store.save_record("u", "a.jpg", "pen", 0.7).await.unwrap();

        assert!(store.remove(&id).await.unwrap());
        assert!(!store.remove(&id).await.unwrap());
        assert!(store.list_for_user("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_user() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.save_record("u", "a.jpg", "x", 0.5).await.unwrap();
        store.save_record("u", "b.jpg", "y", 0.5).await.unwrap();
        store.save_record("v", "c.jpg", "z", 0.5).await.unwrap();

        assert_eq!(store.clear_user("u").await.unwrap(), 2);
        assert!(store.list_for_user("u").await.unwrap().is_empty());
        assert_eq!(store.list_for_user("v").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.db");
        let store = HistoryStore::open(&path).await.unwrap();
        store.save_record("u", "a.jpg", "x", 0.5).await.unwrap();
        assert!(path.exists());
    }
}
