//! SQLite 检查点持久化（rusqlite）
//!
//! 一个线程的检查点由三张表共同组成：
//! - `checkpoints`：每线程最新快照（write_seq、更新时间）
//! - `checkpoint_blobs`：消息内容（整条 Message 的 JSON）
//! - `checkpoint_writes`：写入日志，每次 append 事务一行
//!
//! rusqlite 是同步 API，所有操作经 `spawn_blocking` 执行，避免阻塞 async 调度器。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::store::{stamp_sequences, ConversationStore, StoreError};
use crate::memory::Message;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT PRIMARY KEY,
    write_seq INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoint_blobs (
    thread_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    message_id TEXT NOT NULL,
    role TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (thread_id, sequence)
);

CREATE TABLE IF NOT EXISTS checkpoint_writes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    first_seq INTEGER NOT NULL,
    last_seq INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoint_writes_thread ON checkpoint_writes(thread_id);
"#;

/// rusqlite 检查点存储；连接由 Mutex 串行化
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// 打开或创建数据库；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池中持锁执行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// 某线程在三张表中的残留行数（删除校验用）
    pub async fn residual_rows(&self, thread_id: &str) -> Result<u64, StoreError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut total = 0u64;
            for table in ["checkpoints", "checkpoint_blobs", "checkpoint_writes"] {
                let sql = format!("SELECT COUNT(*) FROM {table} WHERE thread_id = ?1");
                let n: i64 = conn.query_row(&sql, params![thread_id], |row| row.get(0))?;
                total += n as u64;
            }
            Ok(total)
        })
        .await
    }
}

#[async_trait]
impl ConversationStore for SqliteCheckpointStore {
    async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Vec<Message>, StoreError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let last_seq: u64 = tx
                .query_row(
                    "SELECT write_seq FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(|v| v as u64)
                .unwrap_or(0);

            let stamped = stamp_sequences(last_seq, messages);
            for message in &stamped {
                tx.execute(
                    "INSERT INTO checkpoint_blobs (thread_id, sequence, message_id, role, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        thread_id,
                        message.sequence as i64,
                        message.id,
                        message.role.as_str(),
                        serde_json::to_string(message)?,
                    ],
                )?;
            }

            let first_seq = last_seq + 1;
            let write_seq = last_seq + stamped.len() as u64;
            let now = chrono::Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO checkpoint_writes (thread_id, first_seq, last_seq, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, first_seq as i64, write_seq as i64, now],
            )?;
            tx.execute(
                "INSERT INTO checkpoints (thread_id, write_seq, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET write_seq = excluded.write_seq,
                                                     updated_at = excluded.updated_at",
                params![thread_id, write_seq as i64, now],
            )?;
            tx.commit()?;
            Ok(stamped)
        })
        .await
    }

    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM checkpoint_blobs WHERE thread_id = ?1 ORDER BY sequence ASC",
            )?;
            let payloads = stmt
                .query_map(params![thread_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            payloads
                .iter()
                .map(|p| serde_json::from_str::<Message>(p).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            // 任一语句失败时 tx 在 drop 时回滚
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM checkpoint_writes WHERE thread_id = ?1", params![thread_id])?;
            tx.execute("DELETE FROM checkpoint_blobs WHERE thread_id = ?1", params![thread_id])?;
            tx.execute("DELETE FROM checkpoints WHERE thread_id = ?1", params![thread_id])?;
            tx.commit()?;
            tracing::debug!(thread_id = %thread_id, "thread checkpoint deleted");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MessageContent, Role, ToolInvocation};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_preserves_order_and_content() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let call = Message::assistant_tool_call(ToolInvocation {
            id: "call_1".into(),
            name: "setDroneType".into(),
            args: serde_json::json!({"type": "Rotary-wing"}),
        });
        let result = Message::tool_result(
            &call,
            MessageContent::Structured(serde_json::json!({"type": "Rotary-wing"})),
        );
        let batch = vec![Message::user("switch to rotary"), call, result, Message::assistant("Done.")];

        let stamped = store.append("t1", batch.clone()).await.unwrap();
        let loaded = store.load("t1").await.unwrap();

        assert_eq!(loaded, stamped);
        assert_eq!(loaded.len(), 4);
        for (orig, got) in batch.iter().zip(&loaded) {
            assert_eq!(orig.id, got.id);
            assert_eq!(orig.content, got.content);
        }
        assert_eq!(loaded[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn test_sequences_continue_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("conv.db");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.append("t1", vec![Message::user("a"), Message::assistant("b")]).await.unwrap();
        }
        let store = SqliteCheckpointStore::open(&path).unwrap();
        let stamped = store.append("t1", vec![Message::user("c")]).await.unwrap();
        assert_eq!(stamped[0].sequence, 3);

        let checkpoint = store.checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(checkpoint.write_seq, 3);
        assert_eq!(checkpoint.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_all_relations() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.append("t1", vec![Message::user("a")]).await.unwrap();
        store.append("t1", vec![Message::assistant("b")]).await.unwrap();
        store.append("t2", vec![Message::user("keep")]).await.unwrap();
        assert_eq!(store.residual_rows("t1").await.unwrap(), 1 + 2 + 2);

        store.delete_thread("t1").await.unwrap();
        store.delete_thread("t1").await.unwrap();

        assert_eq!(store.residual_rows("t1").await.unwrap(), 0);
        assert!(store.load("t1").await.unwrap().is_empty());
        assert_eq!(store.load("t2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_thread_loads_empty() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(store.load("ghost").await.unwrap().is_empty());
    }
}
