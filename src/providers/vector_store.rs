//! Vector store and embedding model adapters (spec §6).
//!
//! Two record shapes: `code_context` (indexed source chunks) and
//! `knowledge_base` (retrievable documentation/pattern chunks). The trait
//! only covers the operations spec §6 requires: upsert, top-k vector search,
//! and optional metadata-filtered search. [`InMemoryVectorStore`] is the test
//! double, following the shape of `llm-cost-ops`'s `InMemoryAuditStore` /
//! `InMemoryDlqStore`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub type Vector = Vec<f32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeContextRecord {
    pub path: String,
    pub chunk_name: String,
    pub chunk_type: String,
    pub content: String,
    pub vector: Vector,
    pub start_line: u32,
    pub end_line: u32,
    pub content_hash: String,
    pub language: String,
    #[serde(default)]
    pub lint_errors: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseRecord {
    pub source: String,
    pub content: String,
    pub vector: Vector,
    pub knowledge_space: String,
    pub document_type: String,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub source_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub relevance_score: Option<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_code_context(&self, record: CodeContextRecord) -> Result<()>;
    async fn upsert_knowledge(&self, record: KnowledgeBaseRecord) -> Result<()>;

    /// Reads back every indexed chunk for `path` (lint metadata lookup for
    /// C12's static-analysis collaborator).
    async fn get_code_context(&self, path: &str) -> Result<Vec<CodeContextRecord>>;

    /// Top-k search over the knowledge base by embedding similarity.
    async fn search_knowledge(&self, query_vector: &[f32], k: usize) -> Result<Vec<KnowledgeBaseRecord>>;

    /// As above, filtered to records whose metadata matches every given
    /// equality constraint.
    async fn search_knowledge_filtered(
        &self,
        query_vector: &[f32],
        k: usize,
        filters: &HashMap<String, Value>,
    ) -> Result<Vec<KnowledgeBaseRecord>>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// In-memory vector store used by tests and the CLI's offline mode.
#[derive(Default)]
pub struct InMemoryVectorStore {
    code_context: Mutex<Vec<CodeContextRecord>>,
    knowledge_base: Mutex<Vec<KnowledgeBaseRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn top_k<'a>(
        query_vector: &[f32],
        records: &'a [KnowledgeBaseRecord],
        k: usize,
        filters: Option<&HashMap<String, Value>>,
    ) -> Vec<KnowledgeBaseRecord> {
        let mut scored: Vec<(f32, &'a KnowledgeBaseRecord)> = records
            .iter()
            .filter(|r| {
                filters.map_or(true, |f| {
                    f.iter().all(|(k, v)| r.metadata.get(k) == Some(v))
                })
            })
            .map(|r| (cosine_similarity(query_vector, &r.vector), r))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(score, r)| {
                let mut r = r.clone();
                r.relevance_score = Some(score);
                r
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_code_context(&self, record: CodeContextRecord) -> Result<()> {
        let mut store = self.code_context.lock().unwrap();
        if let Some(existing) = store.iter_mut().find(|r| r.path == record.path && r.chunk_name == record.chunk_name) {
            *existing = record;
        } else {
            store.push(record);
        }
        Ok(())
    }

    async fn upsert_knowledge(&self, record: KnowledgeBaseRecord) -> Result<()> {
        let mut store = self.knowledge_base.lock().unwrap();
        if let Some(existing) = store.iter_mut().find(|r| r.source_hash == record.source_hash) {
            *existing = record;
        } else {
            store.push(record);
        }
        Ok(())
    }

    async fn get_code_context(&self, path: &str) -> Result<Vec<CodeContextRecord>> {
        let store = self.code_context.lock().unwrap();
        Ok(store.iter().filter(|r| r.path == path).cloned().collect())
    }

    async fn search_knowledge(&self, query_vector: &[f32], k: usize) -> Result<Vec<KnowledgeBaseRecord>> {
        let store = self.knowledge_base.lock().unwrap();
        Ok(Self::top_k(query_vector, &store, k, None))
    }

    async fn search_knowledge_filtered(
        &self,
        query_vector: &[f32],
        k: usize,
        filters: &HashMap<String, Value>,
    ) -> Result<Vec<KnowledgeBaseRecord>> {
        let store = self.knowledge_base.lock().unwrap();
        Ok(Self::top_k(query_vector, &store, k, Some(filters)))
    }
}

/// Embedding model adapter (spec §6): `embed(text) -> vector`, fixed
/// dimension `D` per deployment.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vector>;
}

/// Deterministic hashing-based embedding used in tests: stable across calls,
/// sensitive to content so similarity ordering is meaningful without a real
/// model.
pub struct InMemoryEmbeddingModel {
    dims: usize,
}

impl InMemoryEmbeddingModel {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingModel for InMemoryEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vector = vec![0.0f32; self.dims];
        for (i, byte) in text.bytes().enumerate() {
            let bucket = i % self.dims;
            vector[bucket] += (byte as f32) / 255.0;
        }
        Ok(vector)
    }
}
