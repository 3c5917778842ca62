//! Relevance re-ranking of deduplicated candidates.
//!
//! The retriever's candidate order reflects query issue order, not
//! relevance. The ranker shows the candidates to a lightweight model with
//! stable numeric indices and keeps the ones it names, in its stated order.
//! Ranking is a quality optimization: on any failure the first candidates
//! in retrieval order are kept instead, and a stray malformed index is
//! dropped without discarding the rest of the ranking.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::CompletionClient;

const RERANK_PROMPT: &str = "\
You are an expert at re-ranking documents based on their relevance to a question.
Given a question and a list of documents (with their index), your task is to \
identify the indices of the FIVE most relevant documents.
Return a comma-separated list of the top 5 indices. Do not include any other text.

Question: {question}

Documents:
{documents}

Top 5 Indices (comma-separated):";

pub struct Ranker {
    client: Arc<dyn CompletionClient>,
    limit: usize,
}

impl Ranker {
    pub fn new(client: Arc<dyn CompletionClient>, limit: usize) -> Self {
        Self { client, limit }
    }

    /// Re-order `passages` by relevance to `query`.
    ///
    /// Returns at most `min(limit, passages.len())` passages. Empty input
    /// returns empty output without a model call. Call failures and
    /// responses with no usable index fall back to the first passages in
    /// their original order.
    pub async fn rerank(&self, query: &str, passages: &[String]) -> Vec<String> {
        if passages.is_empty() {
            return Vec::new();
        }

        let documents = passages
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("Index: {}\nContent: {}", i, doc))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = RERANK_PROMPT
            .replace("{question}", query)
            .replace("{documents}", &documents);

        let response = match self.client.complete(&prompt, 0.0).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "re-ranking call failed, keeping retrieval order");
                return self.first_n(passages);
            }
        };

        // First occurrence wins; a repeated index must not repeat a passage.
        let mut seen = HashSet::new();
        let indices: Vec<usize> = response
            .split(',')
            .filter_map(|token| token.trim().parse::<usize>().ok())
            .filter(|&i| i < passages.len())
            .filter(|&i| seen.insert(i))
            .collect();

        if indices.is_empty() {
            warn!(response = %response, "unusable re-ranking response, keeping retrieval order");
            return self.first_n(passages);
        }

        debug!(?indices, "re-ranked candidates");

        indices
            .into_iter()
            .take(self.limit)
            .map(|i| passages[i].clone())
            .collect()
    }

    fn first_n(&self, passages: &[String]) -> Vec<String> {
        passages.iter().take(self.limit).cloned().collect()
    }
}
