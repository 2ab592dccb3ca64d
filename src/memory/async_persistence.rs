//! 异步 SQLite 检查点持久化（sqlx）
//!
//! 与 `SqliteCheckpointStore` 相同的三表布局，但使用 sqlx 连接池完成完全异步的读写。
//! 需要启用 `async-sqlite` feature。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::memory::store::{stamp_sequences, ConversationStore, StoreError};
    use crate::memory::Message;

    /// sqlx 检查点存储
    pub struct AsyncSqliteCheckpointStore {
        pool: SqlitePool,
    }

    impl AsyncSqliteCheckpointStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;
            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), StoreError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                    thread_id TEXT PRIMARY KEY,
                    write_seq INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoint_blobs (
                    thread_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    message_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (thread_id, sequence)
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoint_writes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id TEXT NOT NULL,
                    first_seq INTEGER NOT NULL,
                    last_seq INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl ConversationStore for AsyncSqliteCheckpointStore {
        async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Vec<Message>, StoreError> {
            if messages.is_empty() {
                return Ok(Vec::new());
            }
            let mut tx = self.pool.begin().await?;

            let last_seq: i64 = sqlx::query("SELECT write_seq FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.get("write_seq"))
                .unwrap_or(0);

            let stamped = stamp_sequences(last_seq as u64, messages);
            for message in &stamped {
                sqlx::query(
                    "INSERT INTO checkpoint_blobs (thread_id, sequence, message_id, role, payload)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(thread_id)
                .bind(message.sequence as i64)
                .bind(&message.id)
                .bind(message.role.as_str())
                .bind(serde_json::to_string(message)?)
                .execute(&mut *tx)
                .await?;
            }

            let write_seq = last_seq + stamped.len() as i64;
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO checkpoint_writes (thread_id, first_seq, last_seq, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(thread_id)
            .bind(last_seq + 1)
            .bind(write_seq)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO checkpoints (thread_id, write_seq, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(thread_id) DO UPDATE SET write_seq = excluded.write_seq,
                                                     updated_at = excluded.updated_at",
            )
            .bind(thread_id)
            .bind(write_seq)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(stamped)
        }

        async fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
            let rows = sqlx::query(
                "SELECT payload FROM checkpoint_blobs WHERE thread_id = ? ORDER BY sequence ASC",
            )
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| {
                    let payload: String = row.get("payload");
                    serde_json::from_str::<Message>(&payload).map_err(StoreError::from)
                })
                .collect()
        }

        async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
            let mut tx = self.pool.begin().await?;
            for sql in [
                "DELETE FROM checkpoint_writes WHERE thread_id = ?",
                "DELETE FROM checkpoint_blobs WHERE thread_id = ?",
                "DELETE FROM checkpoints WHERE thread_id = ?",
            ] {
                sqlx::query(sql).bind(thread_id).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok(())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::AsyncSqliteCheckpointStore;

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::memory::{ConversationStore, Message};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_async_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = AsyncSqliteCheckpointStore::new(dir.path().join("test.db")).await.unwrap();

        let batch = vec![Message::user("Q1"), Message::assistant("A1")];
        store.append("t1", batch.clone()).await.unwrap();
        store.append("t1", vec![Message::user("Q2")]).await.unwrap();

        let loaded = store.load("t1").await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].id, batch[0].id);
        assert_eq!(loaded.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_async_store_delete() {
        let dir = TempDir::new().unwrap();
        let store = AsyncSqliteCheckpointStore::new(dir.path().join("test.db")).await.unwrap();

        store.append("t1", vec![Message::user("x")]).await.unwrap();
        store.delete_thread("t1").await.unwrap();
        store.delete_thread("t1").await.unwrap();

        assert!(store.load("t1").await.unwrap().is_empty());
        assert!(store.checkpoint("t1").await.unwrap().is_none());
    }
}
