//! Multi-query retrieval with fan-out, dedup, and re-ranking.
//!
//! One retrieval call per chat turn: expand the standalone question into a
//! small query set, search the session's collection with every variant
//! concurrently, collapse exact-duplicate passages, label each survivor
//! with its provenance, and hand the set to the ranker.
//!
//! Dedup is defined over the deterministic (query-index, result-index)
//! order — original query's results first, then each variant's in
//! generation order — regardless of which search completes first. The
//! first-seen passage keeps its source label; repeated hits of the same
//! text via other variants are discarded, not merged.

use anyhow::Result;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::expand::QueryExpander;
use crate::index::{Passage, VectorIndex};
use crate::message::{Envelope, MessageKind, Payload};
use crate::rank::Ranker;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    expander: QueryExpander,
    ranker: Ranker,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        expander: QueryExpander,
        ranker: Ranker,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            expander,
            ranker,
            top_k,
        }
    }

    /// Handle a retrieval request envelope, answering with a context
    /// response addressed back to the sender under the same trace id.
    ///
    /// Missing query or session id in the payload is a contract violation.
    pub async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        let session_id = request.payload.require_session_id()?;
        let query = request.payload.require_query()?;

        let context = self.retrieve(session_id, query).await?;

        let mut payload = Payload::with_session(session_id);
        payload.query = Some(query.to_string());
        payload.context = Some(context);

        Ok(Envelope::new(
            &request.receiver,
            &request.sender,
            MessageKind::ContextResponse,
            &request.trace_id,
            payload,
        ))
    }

    /// Retrieve the context passages for one chat turn.
    ///
    /// A session with no ingested passages returns empty immediately —
    /// a valid empty state, not an error — without touching the expander
    /// or ranker. Otherwise the labeled, deduplicated candidates are
    /// returned in the ranker's relevance order.
    pub async fn retrieve(&self, session_id: &str, query: &str) -> Result<Vec<String>> {
        if !self.index.collection_exists(session_id).await? {
            debug!(session_id, "no passage collection for session");
            return Ok(Vec::new());
        }

        let queries = self.expander.expand(query).await;

        // Independent searches, joined in query issue order.
        let searches = queries
            .iter()
            .map(|q| self.index.query(session_id, q, self.top_k));
        let per_query: Vec<Vec<Passage>> = try_join_all(searches).await?;

        let labeled = dedup_and_label(per_query);
        debug!(
            queries = queries.len(),
            candidates = labeled.len(),
            "collected unique passages from multi-query search"
        );

        Ok(self.ranker.rerank(query, &labeled).await)
    }
}

/// Collapse exact-duplicate passage texts, first seen wins, and format each
/// survivor with its source label for downstream provenance.
fn dedup_and_label(per_query: Vec<Vec<Passage>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labeled = Vec::new();

    for passage in per_query.into_iter().flatten() {
        if seen.insert(passage.text.clone()) {
            labeled.push(format!(
                "Source: {}\n\nContent: {}",
                passage.source, passage.text
            ));
        }
    }

    labeled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionClient;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index stub with canned per-query results.
    struct FakeIndex {
        exists: bool,
        results: HashMap<String, Vec<Passage>>,
        queries_issued: AtomicUsize,
    }

    impl FakeIndex {
        fn new(exists: bool, results: Vec<(&str, Vec<Passage>)>) -> Self {
            Self {
                exists,
                results: results
                    .into_iter()
                    .map(|(q, p)| (q.to_string(), p))
                    .collect(),
                queries_issued: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn collection_exists(&self, _session_id: &str) -> Result<bool> {
            Ok(self.exists)
        }

        async fn query(
            &self,
            _session_id: &str,
            text: &str,
            _top_k: usize,
        ) -> Result<Vec<Passage>> {
            self.queries_issued.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.get(text).cloned().unwrap_or_default())
        }

        async fn add_passages(&self, _session_id: &str, _passages: Vec<Passage>) -> Result<()> {
            unreachable!("retriever never writes to the index")
        }
    }

    /// Counts completion calls; answers expansion with canned variants and
    /// re-ranking with an identity ordering.
    struct CountingClient {
        expansion: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for CountingClient {
        async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("re-ranking") {
                Ok("0, 1, 2, 3, 4".to_string())
            } else {
                Ok(self.expansion.clone())
            }
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
            bail!("unavailable")
        }
    }

    fn retriever(index: Arc<FakeIndex>, client: Arc<dyn CompletionClient>) -> Retriever {
        let expander = QueryExpander::new(client.clone(), 0.7, 3);
        let ranker = Ranker::new(client, 5);
        Retriever::new(index, expander, ranker, 5)
    }

    #[tokio::test]
    async fn test_missing_collection_short_circuits() {
        let index = Arc::new(FakeIndex::new(false, vec![]));
        let client = Arc::new(CountingClient {
            expansion: "v1, v2".to_string(),
            calls: AtomicUsize::new(0),
        });
        let retriever = retriever(index.clone(), client.clone());

        let result = retriever.retrieve("sess-1", "anything").await.unwrap();

        assert!(result.is_empty());
        // Neither the expander nor the ranker made a model call, and the
        // index was never searched.
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(index.queries_issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fan_out_searches_every_variant() {
        let index = Arc::new(FakeIndex::new(
            true,
            vec![
                ("original", vec![Passage::new("alpha", "a.txt")]),
                ("v1", vec![Passage::new("beta", "b.txt")]),
                ("v2", vec![Passage::new("gamma", "c.txt")]),
            ],
        ));
        let client = Arc::new(CountingClient {
            expansion: "v1, v2".to_string(),
            calls: AtomicUsize::new(0),
        });
        let retriever = retriever(index.clone(), client);

        let result = retriever.retrieve("sess-1", "original").await.unwrap();

        assert_eq!(index.queries_issued.load(Ordering::SeqCst), 3);
        assert_eq!(result.len(), 3);
        assert!(result[0].contains("alpha"));
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_seen_metadata() {
        // "shared" appears for the original query (a.txt) and again for a
        // variant (z.txt): the first-seen label must survive.
        let index = Arc::new(FakeIndex::new(
            true,
            vec![
                (
                    "original",
                    vec![
                        Passage::new("shared", "a.txt"),
                        Passage::new("only-original", "a.txt"),
                    ],
                ),
                ("v1", vec![Passage::new("shared", "z.txt")]),
            ],
        ));
        let client = Arc::new(CountingClient {
            expansion: "v1".to_string(),
            calls: AtomicUsize::new(0),
        });
        let retriever = retriever(index, client);

        let result = retriever.retrieve("sess-1", "original").await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], "Source: a.txt\n\nContent: shared");
        assert!(!result.iter().any(|r| r.contains("z.txt")));
    }

    #[tokio::test]
    async fn test_expansion_failure_degrades_to_single_query() {
        let index = Arc::new(FakeIndex::new(
            true,
            vec![("original", vec![Passage::new("alpha", "a.txt")])],
        ));
        let retriever = retriever(index.clone(), Arc::new(FailingClient));

        // Expansion fails (original only) and ranking fails (first-5
        // fallback); the turn still produces context.
        let result = retriever.retrieve("sess-1", "original").await.unwrap();

        assert_eq!(index.queries_issued.load(Ordering::SeqCst), 1);
        assert_eq!(result, vec!["Source: a.txt\n\nContent: alpha".to_string()]);
    }

    #[test]
    fn test_dedup_and_label_no_duplicate_texts() {
        let per_query = vec![
            vec![Passage::new("one", "s1"), Passage::new("two", "s2")],
            vec![Passage::new("two", "s3"), Passage::new("three", "s4")],
        ];
        let labeled = dedup_and_label(per_query);
        assert_eq!(labeled.len(), 3);
        assert_eq!(labeled[1], "Source: s2\n\nContent: two");
        assert_eq!(labeled[2], "Source: s4\n\nContent: three");
    }
}
