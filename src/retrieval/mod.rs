//! Retrieval cache: embeddings, vector store, bounded LRU caches.

pub mod cache;
pub mod embedding;
pub mod store;

pub use cache::{CacheStats, LruCache};
pub use embedding::{EmbeddingChain, EmbeddingProvider, hash_embedding};
pub use store::{IndexMatch, SearchHit, VectorDocument, VectorIndex, VectorStore, cosine_similarity};
