//! Embedding-indexed document store with nearest-neighbor search.
//!
//! Documents live in an in-process map. When an external [`VectorIndex`] is
//! configured, search and upsert delegate to it (time-boxed, upserts
//! fire-and-forget); otherwise similarity is computed in-process as cosine
//! similarity over every stored embedding passing the metadata filter. Two
//! bounded LRU caches front document reads and search results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::OrchestratorConfig;
use crate::error::RetrievalError;
use crate::retrieval::cache::{CacheStats, LruCache};
use crate::retrieval::embedding::EmbeddingChain;

/// A stored document with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A match returned by an external index.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// External vector index contract (implemented outside the core).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: &HashMap<String, String>,
    ) -> Result<(), RetrievalError>;

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &HashMap<String, String>,
    ) -> Result<Vec<IndexMatch>, RetrievalError>;
}

/// A search hit, hydrated with content when the document is known locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Embedding-indexed content store backing the retrieval cache.
pub struct VectorStore {
    documents: RwLock<HashMap<String, VectorDocument>>,
    embeddings: EmbeddingChain,
    index: Option<Arc<dyn VectorIndex>>,
    index_timeout: Duration,
    document_cache: Mutex<LruCache<String, VectorDocument>>,
    search_cache: Mutex<LruCache<String, Vec<SearchHit>>>,
}

impl VectorStore {
    pub fn new(config: &OrchestratorConfig, embeddings: EmbeddingChain) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            embeddings,
            index: None,
            index_timeout: config.index_timeout,
            document_cache: Mutex::new(LruCache::new(config.document_cache_capacity)),
            search_cache: Mutex::new(LruCache::new(config.search_cache_capacity)),
        }
    }

    /// Attach an external index; search and upsert will delegate to it.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Store (or replace) a document: embeds the content, updates the local
    /// map and caches, and pushes to the external index fire-and-forget.
    pub async fn upsert(
        &self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: HashMap<String, String>,
    ) {
        let id = id.into();
        let content = content.into();
        let embedding = self.embeddings.embed(&content).await;

        let doc = VectorDocument {
            id: id.clone(),
            content,
            metadata,
            embedding,
        };

        self.documents
            .write()
            .await
            .insert(id.clone(), doc.clone());
        self.document_cache.lock().await.set(id.clone(), doc.clone());
        // Cached result lists may now be stale.
        self.search_cache.lock().await.clear();

        if let Some(index) = &self.index {
            let index = index.clone();
            let timeout = self.index_timeout;
            tokio::spawn(async move {
                let result = tokio::time::timeout(
                    timeout,
                    index.upsert(&doc.id, &doc.embedding, &doc.metadata),
                )
                .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(id = %doc.id, error = %e, "External index upsert failed")
                    }
                    Err(_) => {
                        tracing::warn!(id = %doc.id, "External index upsert timed out")
                    }
                }
            });
        }
    }

    /// Fetch a document by id through the document cache.
    pub async fn get(&self, id: &str) -> Option<VectorDocument> {
        if let Some(doc) = self.document_cache.lock().await.get(&id.to_string()) {
            return Some(doc.clone());
        }
        let doc = self.documents.read().await.get(id).cloned()?;
        self.document_cache
            .lock()
            .await
            .set(id.to_string(), doc.clone());
        Some(doc)
    }

    /// Nearest-neighbor search.
    ///
    /// Delegates to the external index when configured; a query that exceeds
    /// its time box returns an empty result set rather than blocking.
    pub async fn search(
        &self,
        query: &str,
        filter: &HashMap<String, String>,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let cache_key = Self::search_cache_key(query, filter, top_k);
        if let Some(hits) = self.search_cache.lock().await.get(&cache_key) {
            return hits.clone();
        }

        let query_embedding = self.embeddings.embed(query).await;

        let hits = match &self.index {
            Some(index) => {
                match tokio::time::timeout(
                    self.index_timeout,
                    index.query(&query_embedding, top_k, filter),
                )
                .await
                {
                    Ok(Ok(matches)) => {
                        let documents = self.documents.read().await;
                        matches
                            .into_iter()
                            .map(|m| SearchHit {
                                content: documents.get(&m.id).map(|d| d.content.clone()),
                                id: m.id,
                                score: m.score,
                                metadata: m.metadata,
                            })
                            .collect()
                    }
                    Ok(Err(e)) => {
                        // Not cached: the next search retries the index.
                        tracing::warn!(error = %e, "External index query failed");
                        return Vec::new();
                    }
                    Err(_) => {
                        tracing::warn!("External index query timed out");
                        return Vec::new();
                    }
                }
            }
            None => self.search_local(&query_embedding, filter, top_k).await,
        };

        self.search_cache.lock().await.set(cache_key, hits.clone());
        hits
    }

    async fn search_local(
        &self,
        query_embedding: &[f32],
        filter: &HashMap<String, String>,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let documents = self.documents.read().await;
        let mut hits: Vec<SearchHit> = documents
            .values()
            .filter(|doc| Self::matches_filter(doc, filter))
            .map(|doc| SearchHit {
                id: doc.id.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
                content: Some(doc.content.clone()),
                metadata: doc.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    /// Exact-match metadata filter: every filter pair must be present.
    fn matches_filter(doc: &VectorDocument, filter: &HashMap<String, String>) -> bool {
        filter
            .iter()
            .all(|(k, v)| doc.metadata.get(k).is_some_and(|dv| dv == v))
    }

    fn search_cache_key(query: &str, filter: &HashMap<String, String>, top_k: usize) -> String {
        let mut pairs: Vec<_> = filter.iter().collect();
        pairs.sort();
        let filter_key = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{query}|{filter_key}|{top_k}")
    }

    /// Hit/miss and occupancy for (document cache, search cache).
    pub async fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (
            self.document_cache.lock().await.stats(),
            self.search_cache.lock().await.stats(),
        )
    }
}
