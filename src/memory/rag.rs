//! 检索增强（RAG）
//!
//! VectorStore 负责相似度检索；RetrievalAugmentor 在其之上截断到 k 条，并把文档渲染为
//! 带来源标注的上下文。检索结果保持向量库给出的顺序，不再二次排序或过滤。

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::{EmbeddingProvider, LlmError};

/// 默认检索条数
pub const DEFAULT_K: usize = 2;

/// 向量库错误（检索阶段降级为空上下文，不中止轮次）
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("Corpus error: {0}")]
    Corpus(String),
}

/// 向量库返回的一条结果
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredDocument {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl ScoredDocument {
    /// 来源 id：metadata 中的 `source`，缺省为 "unknown"
    pub fn source(&self) -> String {
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

/// 向量库 trait：按相似度降序返回至多 k 条
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// 语料文件中的一条文档（已预先分块）
#[derive(Clone, Debug, Deserialize)]
pub struct CorpusDocument {
    pub source: String,
    pub content: String,
}

/// 读取 `[{source, content}]` 格式的语料文件
pub async fn read_corpus(path: impl AsRef<Path>) -> Result<Vec<CorpusDocument>, RetrievalError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RetrievalError::Corpus(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| RetrievalError::Corpus(format!("{}: {e}", path.display())))
}

fn source_metadata(source: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::String(source.to_string()));
    metadata
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct Entry {
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

/// 导入语料时同时在途的嵌入请求数
pub const EMBED_CONCURRENCY: usize = 8;

/// 内存向量库：嵌入 + 余弦相似度
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<Entry>>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_entries: usize,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
            max_entries,
        }
    }

    /// 添加一条文档；超出上限时移除最旧的
    pub async fn add_document(&self, source: &str, content: &str) -> Result<(), RetrievalError> {
        let embedding = self.embedder.embed(content).await?;
        if embedding.is_empty() {
            return Err(RetrievalError::Corpus(format!("empty embedding for {source}")));
        }
        self.push(Entry {
            content: content.to_string(),
            metadata: source_metadata(source),
            embedding,
        })
        .await;
        Ok(())
    }

    /// 从语料文件批量导入，返回导入条数
    pub async fn load_corpus(&self, path: impl AsRef<Path>) -> Result<usize, RetrievalError> {
        let docs = read_corpus(path).await?;
        let embedder = self.embedder.clone();
        let mut embedded = stream::iter(docs)
            .map(|doc| {
                let embedder = embedder.clone();
                async move {
                    let embedding = embedder.embed(&doc.content).await;
                    (doc, embedding)
                }
            })
            .buffered(EMBED_CONCURRENCY);

        let mut added = 0;
        while let Some((doc, embedding)) = embedded.next().await {
            let embedding = embedding?;
            if embedding.is_empty() {
                continue;
            }
            self.push(Entry {
                metadata: source_metadata(&doc.source),
                content: doc.content,
                embedding,
            })
            .await;
            added += 1;
        }
        Ok(added)
    }

    async fn push(&self, entry: Entry) {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        let n = entries.len();
        if n > self.max_entries {
            entries.drain(0..n - self.max_entries);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|e| ScoredDocument {
                content: e.content.clone(),
                metadata: e.metadata.clone(),
                score: cosine_similarity(&query_embedding, &e.embedding),
            })
            .filter(|d| d.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// 将文本切分为小写词集合，去掉标点
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 关键词重叠检索：无需嵌入服务，适合离线运行与测试
#[derive(Default)]
pub struct KeywordVectorStore {
    entries: RwLock<Vec<(String, Map<String, Value>, HashSet<String>)>>,
}

impl KeywordVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_document(&self, source: &str, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        self.entries
            .write()
            .await
            .push((content.to_string(), source_metadata(source), tokenize_lower(content)));
    }

    pub async fn load_corpus(&self, path: impl AsRef<Path>) -> Result<usize, RetrievalError> {
        let docs = read_corpus(path).await?;
        let n = docs.len();
        for doc in docs {
            self.add_document(&doc.source, &doc.content).await;
        }
        Ok(n)
    }
}

#[async_trait]
impl VectorStore for KeywordVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(content, metadata, tokens)| ScoredDocument {
                content: content.clone(),
                metadata: metadata.clone(),
                score: query_tokens.intersection(tokens).count() as f32 / query_tokens.len() as f32,
            })
            .filter(|d| d.score > 0.0)
            .collect();
        // 稳定排序：同分保持插入顺序
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// 检索得到的文档
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedDocument {
    pub source_id: String,
    pub content: String,
    pub score: f32,
}

/// 检索增强器
pub struct RetrievalAugmentor {
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl RetrievalAugmentor {
    pub fn new(store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { store, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// 检索至多 `k` 条；无结果时返回空 Vec
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let mut docs: Vec<RetrievedDocument> = self
            .store
            .similarity_search(query, k)
            .await?
            .into_iter()
            .map(|d| RetrievedDocument {
                source_id: d.source(),
                content: d.content,
                score: d.score,
            })
            .collect();
        docs.truncate(k);
        tracing::debug!(query = %query, hits = docs.len(), "retrieval done");
        Ok(docs)
    }

    /// 使用配置的默认 k
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        self.retrieve(query, self.k).await
    }

    /// 渲染为 `Source: <id>\nContent: <text>`，多条以换行连接
    pub fn render_context(docs: &[RetrievedDocument]) -> String {
        docs.iter()
            .map(|d| format!("Source: {}\nContent: {}", d.source_id, d.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 按词表生成 one-hot 计数向量，便于断言
    struct BagOfWords(Vec<&'static str>);

    #[async_trait]
    impl EmbeddingProvider for BagOfWords {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            let lower = text.to_lowercase();
            Ok(self.0.iter().map(|w| lower.matches(w).count() as f32).collect())
        }
    }

    /// 记录同时在途的嵌入请求峰值
    #[derive(Default)]
    struct InFlightCounter {
        current: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for InFlightCounter {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            use std::sync::atomic::Ordering;
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0])
        }
    }

    struct Unreachable;

    #[async_trait]
    impl VectorStore for Unreachable {
        async fn similarity_search(&self, _: &str, _: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
            Err(RetrievalError::Unavailable("connection refused".into()))
        }
    }

    /// 忽略 k、总是返回 5 条的向量库
    struct Overflowing;

    #[async_trait]
    impl VectorStore for Overflowing {
        async fn similarity_search(&self, _: &str, _: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
            Ok((0..5)
                .map(|i| ScoredDocument {
                    content: format!("doc {i}"),
                    metadata: source_metadata(&format!("s{i}")),
                    score: 1.0,
                })
                .collect())
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_embedding_store_ranks_by_similarity() {
        let store = InMemoryVectorStore::new(Arc::new(BagOfWords(vec!["battery", "wing", "motor"])), 100);
        store.add_document("wings.md", "wing span and wing area").await.unwrap();
        store.add_document("power.md", "battery capacity drives flight time").await.unwrap();

        let hits = store.similarity_search("battery life", 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source(), "power.md");
    }

    #[tokio::test]
    async fn test_embedding_store_respects_max_entries() {
        let store = InMemoryVectorStore::new(Arc::new(BagOfWords(vec!["doc"])), 2);
        for i in 0..3 {
            store.add_document(&format!("d{i}"), "doc").await.unwrap();
        }
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_corpus_embedding_is_bounded() {
        let docs: Vec<serde_json::Value> = (0..40)
            .map(|i| serde_json::json!({"source": format!("d{i}.md"), "content": format!("doc {i}")}))
            .collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::Value::Array(docs)).unwrap();

        let counter = Arc::new(InFlightCounter::default());
        let store = InMemoryVectorStore::new(counter.clone(), 100);
        assert_eq!(store.load_corpus(file.path()).await.unwrap(), 40);
        assert_eq!(store.len().await, 40);

        let peak = counter.peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!(peak >= 1 && peak <= EMBED_CONCURRENCY, "peak in-flight {peak}");
    }

    #[tokio::test]
    async fn test_keyword_store_and_corpus_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"source": "a.md", "content": "Flight time depends on battery capacity."}},
                {{"source": "b.md", "content": "Propellers convert torque to thrust."}}]"#
        )
        .unwrap();

        let store = KeywordVectorStore::new();
        assert_eq!(store.load_corpus(file.path()).await.unwrap(), 2);

        let hits = store.similarity_search("What is flight time related to?", 2).await.unwrap();
        assert_eq!(hits[0].source(), "a.md");
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn test_augmentor_caps_results_at_k() {
        let augmentor = RetrievalAugmentor::new(Arc::new(Overflowing), DEFAULT_K);
        let docs = augmentor.retrieve_default("anything").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_id, "s0");
    }

    #[tokio::test]
    async fn test_augmentor_zero_results_is_not_an_error() {
        let augmentor = RetrievalAugmentor::new(Arc::new(KeywordVectorStore::new()), 2);
        assert!(augmentor.retrieve("nothing indexed", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_augmentor_surfaces_store_errors() {
        let augmentor = RetrievalAugmentor::new(Arc::new(Unreachable), 2);
        assert!(matches!(
            augmentor.retrieve("q", 2).await,
            Err(RetrievalError::Unavailable(_))
        ));
    }

    #[test]
    fn test_render_context_attributes_sources() {
        let docs = vec![
            RetrievedDocument { source_id: "a".into(), content: "one".into(), score: 0.9 },
            RetrievedDocument { source_id: "b".into(), content: "two".into(), score: 0.5 },
        ];
        assert_eq!(
            RetrievalAugmentor::render_context(&docs),
            "Source: a\nContent: one\nSource: b\nContent: two"
        );
    }
}
