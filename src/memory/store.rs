//! 会话存储（检查点）抽象
//!
//! ConversationStore 负责按线程追加 / 加载 / 删除消息。append 是一次事务：要么整批写入，要么不写；
//! delete_thread 对同一线程的全部记录原子生效，删除不存在的线程是 no-op。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::{Message, Thread};

/// 持久化错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("SQLite (async) error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// 线程检查点：可据此精确恢复会话
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub write_seq: u64,
}

/// 会话存储 trait；不同 thread_id 上的操作互不影响
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 事务性追加，返回已分配 sequence 的消息
    async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Vec<Message>, StoreError>;

    /// 按 sequence 升序加载；线程不存在时返回空 Vec
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;

    /// 删除线程的全部记录（幂等）
    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError>;

    async fn load_thread(&self, thread_id: &str) -> Result<Thread, StoreError> {
        let messages = self.load(thread_id).await?;
        Ok(Thread::new(thread_id, messages))
    }

    /// 最新检查点；线程不存在时为 None
    async fn checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let thread = self.load_thread(thread_id).await?;
        if thread.is_empty() {
            return Ok(None);
        }
        Ok(Some(Checkpoint {
            thread_id: thread.id,
            write_seq: thread.last_write_seq,
            messages: thread.messages,
        }))
    }
}

/// 为一批新消息分配连续 sequence，从 `last_seq + 1` 开始
pub(crate) fn stamp_sequences(last_seq: u64, messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .enumerate()
        .map(|(i, mut m)| {
            m.sequence = last_seq + i as u64 + 1;
            m
        })
        .collect()
}

/// 内存实现：进程内有效，适合测试与 `backend = "memory"`
#[derive(Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, Thread>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append(&self, thread_id: &str, messages: Vec<Message>) -> Result<Vec<Message>, StoreError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Thread::new(thread_id, Vec::new()));
        let stamped = stamp_sequences(thread.last_write_seq, messages);
        thread.messages.extend(stamped.iter().cloned());
        thread.last_write_seq = stamped.last().map(|m| m.sequence).unwrap_or(thread.last_write_seq);
        Ok(stamped)
    }

    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        self.threads.write().await.remove(thread_id);
        Ok(())
    }
}
