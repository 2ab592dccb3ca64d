//! 记忆层：会话数据模型、检查点存储、检索增强

pub mod async_persistence;
pub mod conversation;
pub mod persistence;
pub mod rag;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::AsyncSqliteCheckpointStore;
pub use conversation::{Message, MessageContent, Role, Thread, ToolInvocation};
pub use persistence::SqliteCheckpointStore;
pub use rag::{
    InMemoryVectorStore, KeywordVectorStore, RetrievalAugmentor, RetrievalError, RetrievedDocument,
    ScoredDocument, VectorStore,
};
pub use store::{Checkpoint, ConversationStore, InMemoryStore, StoreError};
