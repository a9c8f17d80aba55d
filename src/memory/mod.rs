//! Session memory: short-term recency plus the retrieval-cache bridge.
//!
//! A thin coordination layer feeding prior context into workers. Short-term
//! entries live in a bounded per-session list with expiry pruning on read;
//! everything is also upserted into the shared [`VectorStore`] so `recall`
//! can merge semantic hits with recent entries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::retrieval::{SearchHit, VectorStore};

/// Memory entry type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Conversation,
    Entity,
    Episodic,
    Semantic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Entity => "entity",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
        }
    }
}

/// One remembered item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: MemoryKind,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    pub fn new(session_id: Uuid, kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            content: content.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, when: DateTime<Utc>) -> Self {
        self.expires_at = Some(when);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Context recalled for a worker: semantic hits plus recent entries.
#[derive(Debug, Clone)]
pub struct RecalledContext {
    pub semantic: Vec<SearchHit>,
    pub recent: Vec<MemoryEntry>,
}

/// Coordinates short-term session memory and the retrieval cache.
pub struct SessionMemory {
    capacity: usize,
    sessions: RwLock<HashMap<Uuid, Vec<MemoryEntry>>>,
    store: Arc<VectorStore>,
}

impl SessionMemory {
    pub fn new(store: Arc<VectorStore>, capacity: usize) -> Self {
        Self {
            capacity,
            sessions: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Record an entry: appended short-term and upserted into the vector
    /// store tagged with its session and kind.
    pub async fn remember(&self, entry: MemoryEntry) {
        let mut metadata = entry.metadata.clone();
        metadata.insert("session_id".to_string(), entry.session_id.to_string());
        metadata.insert("kind".to_string(), entry.kind.as_str().to_string());
        self.store
            .upsert(entry.id.to_string(), entry.content.clone(), metadata)
            .await;

        let mut sessions = self.sessions.write().await;
        let entries = sessions.entry(entry.session_id).or_default();
        entries.push(entry);
        while entries.len() > self.capacity {
            entries.remove(0);
        }
    }

    /// Most recent unexpired entries for a session, newest last. Expired
    /// entries are pruned on read.
    pub async fn recent(&self, session_id: Uuid, limit: usize) -> Vec<MemoryEntry> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let Some(entries) = sessions.get_mut(&session_id) else {
            return Vec::new();
        };
        entries.retain(|e| !e.is_expired(now));

        let skip = entries.len().saturating_sub(limit);
        entries[skip..].to_vec()
    }

    /// Recall prior context: session-scoped semantic search merged with the
    /// most recent short-term entries.
    pub async fn recall(&self, session_id: Uuid, query: &str, top_k: usize) -> RecalledContext {
        let filter = HashMap::from([("session_id".to_string(), session_id.to_string())]);
        let semantic = self.store.search(query, &filter, top_k).await;
        let recent = self.recent(session_id, top_k).await;
        RecalledContext { semantic, recent }
    }

    /// Drop a session's short-term memory.
    pub async fn clear_session(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::retrieval::EmbeddingChain;

    fn memory(capacity: usize) -> SessionMemory {
        let config = OrchestratorConfig::default();
        let chain = EmbeddingChain::new(32, StdDuration::from_secs(1));
        let store = Arc::new(VectorStore::new(&config, chain));
        SessionMemory::new(store, capacity)
    }

    #[tokio::test]
    async fn remember_and_recent() {
        let memory = memory(10);
        let session = Uuid::new_v4();

        memory
            .remember(MemoryEntry::new(session, MemoryKind::Conversation, "hello"))
            .await;
        memory
            .remember(MemoryEntry::new(session, MemoryKind::Conversation, "world"))
            .await;

        let recent = memory.recent(session, 10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "world");
    }

    #[tokio::test]
    async fn capacity_bounds_short_term() {
        let memory = memory(3);
        let session = Uuid::new_v4();

        for i in 0..5 {
            memory
                .remember(MemoryEntry::new(
                    session,
                    MemoryKind::Episodic,
                    format!("event {i}"),
                ))
                .await;
        }

        let recent = memory.recent(session, 10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "event 2");
    }

    #[tokio::test]
    async fn expired_entries_pruned_on_read() {
        let memory = memory(10);
        let session = Uuid::new_v4();

        memory
            .remember(
                MemoryEntry::new(session, MemoryKind::Conversation, "stale")
                    .expires_at(Utc::now() - Duration::seconds(1)),
            )
            .await;
        memory
            .remember(MemoryEntry::new(session, MemoryKind::Conversation, "fresh"))
            .await;

        let recent = memory.recent(session, 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "fresh");
    }

    #[tokio::test]
    async fn recall_is_session_scoped() {
        let memory = memory(10);
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();

        memory
            .remember(MemoryEntry::new(
                mine,
                MemoryKind::Semantic,
                "rust borrow checker notes",
            ))
            .await;
        memory
            .remember(MemoryEntry::new(
                theirs,
                MemoryKind::Semantic,
                "rust borrow checker notes",
            ))
            .await;

        let recalled = memory.recall(mine, "borrow checker", 5).await;
        assert_eq!(recalled.semantic.len(), 1);
        assert_eq!(recalled.recent.len(), 1);
        assert_eq!(recalled.recent[0].session_id, mine);
    }

    #[tokio::test]
    async fn clear_session_drops_short_term() {
        let memory = memory(10);
        let session = Uuid::new_v4();

        memory
            .remember(MemoryEntry::new(session, MemoryKind::Entity, "acme corp"))
            .await;
        assert_eq!(memory.session_count().await, 1);

        memory.clear_session(session).await;
        assert_eq!(memory.session_count().await, 0);
        assert!(memory.recent(session, 10).await.is_empty());
    }
}
