//! C7 — Knowledge Retriever.
//!
//! A stateless façade over the vector store and embedding model (spec
//! §4.7). Formats retrieved chunks as a deterministic text block so prompts
//! built from it are reproducible across runs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::providers::llm::{LlmMessage, ModelRegistry, ModelTier};
use crate::providers::vector_store::{EmbeddingModel, KnowledgeBaseRecord, VectorStore};

pub struct KnowledgeRetriever {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
}

fn format_chunks(records: &[KnowledgeBaseRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[KNOWLEDGE {}] SOURCE: {}\n{}", i + 1, r.source, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl KnowledgeRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    async fn embed_and_search(&self, query: &str, k: usize) -> crate::error::Result<Vec<KnowledgeBaseRecord>> {
        let vector = self.embedder.embed(query).await?;
        self.store.search_knowledge(&vector, k).await
    }

    /// Embeds `query`, searches the top-k knowledge chunks, and returns them
    /// formatted. Returns `""` on any failure rather than propagating — this
    /// is a best-effort enrichment, not a required step (spec §4.7).
    pub async fn retrieve_context(&self, query: &str, k: usize) -> String {
        match self.embed_and_search(query, k).await {
            Ok(records) => format_chunks(&records),
            Err(e) => {
                warn!(error = %e, "knowledge retrieval failed, returning empty context");
                String::new()
            }
        }
    }

    /// Retrieves for `main_query` first, then each sub-query in order,
    /// deduplicating by exact content and stopping once the approximate
    /// token budget (chars/4) is exhausted (spec §4.7 step 2-3).
    pub async fn retrieve_composite_context(
        &self,
        main_query: &str,
        sub_queries: &[String],
        k_main: usize,
        k_sub: usize,
        max_tokens: usize,
    ) -> String {
        let mut seen_content = HashSet::new();
        let mut all_records = Vec::new();

        if let Ok(main_records) = self.embed_and_search(main_query, k_main).await {
            for r in main_records {
                if seen_content.insert(r.content.clone()) {
                    all_records.push(r);
                }
            }
        }

        let mut approx_tokens: usize = all_records.iter().map(|r| r.content.len() / 4).sum();

        'subqueries: for sub in sub_queries {
            if approx_tokens >= max_tokens {
                break;
            }
            if let Ok(sub_records) = self.embed_and_search(sub, k_sub).await {
                for r in sub_records {
                    if approx_tokens >= max_tokens {
                        break 'subqueries;
                    }
                    if seen_content.insert(r.content.clone()) {
                        approx_tokens += r.content.len() / 4;
                        all_records.push(r);
                    }
                }
            }
        }

        format_chunks(&all_records)
    }

    /// Optional LLM-based summarization of already-retrieved `chunks` text;
    /// falls back to the raw formatted chunks when no model is given or the
    /// call fails.
    pub async fn synthesize_context(
        &self,
        query: &str,
        chunks: &str,
        model: Option<(&ModelRegistry, ModelTier)>,
    ) -> String {
        let Some((registry, tier)) = model else {
            return chunks.to_string();
        };
        if chunks.is_empty() {
            return chunks.to_string();
        }
        let Ok(provider) = registry.get(tier) else {
            return chunks.to_string();
        };
        let prompt = format!(
            "Summarize the following retrieved context for the task \"{query}\", preserving concrete facts:\n\n{chunks}"
        );
        match provider.response(&[LlmMessage::user(prompt)]).await {
            Ok(response) => response.message.content,
            Err(e) => {
                warn!(error = %e, "context synthesis failed, falling back to raw chunks");
                chunks.to_string()
            }
        }
    }
}

/// Knowledge cache key: `"{task}::{system_type}::{architecture_pattern}"`
/// (spec §4.7).
pub fn knowledge_cache_key(task: &str, system_type: &str, architecture_pattern: &str) -> String {
    format!("{task}::{system_type}::{architecture_pattern}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::vector_store::InMemoryEmbeddingModel;
    use crate::providers::vector_store::InMemoryVectorStore;
    use chrono::Utc;
    use std::collections::HashMap;

    fn record(source: &str, content: &str) -> KnowledgeBaseRecord {
        KnowledgeBaseRecord {
            source: source.to_string(),
            content: content.to_string(),
            vector: vec![1.0, 0.0],
            knowledge_space: "default".to_string(),
            document_type: "best_practice".to_string(),
            framework: None,
            version: None,
            source_hash: source.to_string(),
            metadata: HashMap::new(),
            last_updated: Utc::now(),
            relevance_score: None,
        }
    }

    #[tokio::test]
    async fn retrieve_context_formats_chunks() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.upsert_knowledge(record("doc1", "use async fn")).await.unwrap();
        let retriever = KnowledgeRetriever::new(Arc::new(InMemoryEmbeddingModel::new(8)), store);

        let context = retriever.retrieve_context("async patterns", 5).await;
        assert!(context.contains("[KNOWLEDGE 1] SOURCE: doc1"));
        assert!(context.contains("use async fn"));
    }

    #[tokio::test]
    async fn retrieve_context_empty_store_returns_empty_string() {
        let store = Arc::new(InMemoryVectorStore::new());
        let retriever = KnowledgeRetriever::new(Arc::new(InMemoryEmbeddingModel::new(8)), store);
        let context = retriever.retrieve_context("anything", 5).await;
        assert_eq!(context, "");
    }

    #[tokio::test]
    async fn composite_context_dedups_by_content() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.upsert_knowledge(record("doc1", "shared content")).await.unwrap();
        let retriever = KnowledgeRetriever::new(Arc::new(InMemoryEmbeddingModel::new(8)), store);

        let context = retriever
            .retrieve_composite_context("main", &["sub".to_string()], 5, 5, 10_000)
            .await;
        assert_eq!(context.matches("shared content").count(), 1);
    }

    #[tokio::test]
    async fn composite_context_respects_token_budget() {
        let store = Arc::new(InMemoryVectorStore::new());
        for i in 0..10 {
            store
                .upsert_knowledge(record(&format!("doc{i}"), &"x".repeat(200)))
                .await
                .unwrap();
        }
        let retriever = KnowledgeRetriever::new(Arc::new(InMemoryEmbeddingModel::new(8)), store);
        let context = retriever
            .retrieve_composite_context("main", &[], 10, 0, 20)
            .await;
        assert!(context.len() < 10 * 200);
    }

    #[test]
    fn cache_key_format() {
        assert_eq!(knowledge_cache_key("add docstring", "cli_tool", "layered"), "add docstring::cli_tool::layered");
    }
}
