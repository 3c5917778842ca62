//! Vector index abstraction and an in-memory implementation.
//!
//! The retrieval stage only ever talks to the index through [`VectorIndex`]:
//! an existence check, a top-k similarity query, and the write seam the
//! ingestion side uses to hand over pre-chunked passages. How passages are
//! embedded, persisted, or indexed is the backend's business.
//!
//! [`MemoryIndex`] is the bundled backend: per-session passage collections
//! behind an `RwLock`, scored by brute-force term overlap. It is a process-
//! local stand-in, not a storage engine — queries against a session that
//! was never populated return the "no collection" state rather than an
//! empty result set.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// A passage stored in, or returned from, the index.
#[derive(Debug, Clone)]
pub struct Passage {
    pub text: String,
    pub source: String,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Abstract session-scoped passage index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](VectorIndex::collection_exists) | Has this session ingested anything? |
/// | [`query`](VectorIndex::query) | Top-k similarity search within one session |
/// | [`add_passages`](VectorIndex::add_passages) | Append pre-chunked passages to a session |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns whether a passage collection exists for `session_id`.
    ///
    /// Distinct from an empty query result: a missing collection lets the
    /// retriever skip expansion and ranking entirely.
    async fn collection_exists(&self, session_id: &str) -> Result<bool>;

    /// Similarity search within one session's collection.
    ///
    /// Returns at most `top_k` passages, best first. An unknown session
    /// returns an empty result.
    async fn query(&self, session_id: &str, text: &str, top_k: usize) -> Result<Vec<Passage>>;

    /// Append passages to a session's collection, creating it if needed.
    async fn add_passages(&self, session_id: &str, passages: Vec<Passage>) -> Result<()>;
}

struct Scored {
    passage: Passage,
    score: f64,
}

/// In-memory index with brute-force term-overlap scoring.
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Vec<Passage>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn collection_exists(&self, session_id: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap();
        Ok(collections.contains_key(session_id))
    }

    async fn query(&self, session_id: &str, text: &str, top_k: usize) -> Result<Vec<Passage>> {
        let query_lower = text.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let collections = self.collections.read().unwrap();
        let passages = match collections.get(session_id) {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };

        let mut scored: Vec<Scored> = passages
            .iter()
            .filter_map(|p| {
                let text_lower = p.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                if matches > 0 {
                    Some(Scored {
                        passage: p.clone(),
                        score: matches as f64,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|s| s.passage).collect())
    }

    async fn add_passages(&self, session_id: &str, passages: Vec<Passage>) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(session_id.to_string())
            .or_default()
            .extend(passages);
        Ok(())
    }
}
