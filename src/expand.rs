//! Multi-query expansion for retrieval recall.
//!
//! A single embedding of the user's phrasing can miss passages that say the
//! same thing differently. The expander asks a lightweight model for
//! paraphrased variants of the query; the retriever searches with all of
//! them. Expansion is a recall optimization, never a correctness gate — on
//! any failure the original query alone is used.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::CompletionClient;

const MULTI_QUERY_PROMPT: &str = "\
You are an expert at generating search queries. Given a user's question, \
generate three additional versions of the question that are semantically \
similar but use different phrasing.
The goal is to improve the recall of a vector database search.
Return a comma-separated list of the queries. Do not include the original question.

Original Question: {question}

Generated Queries (comma-separated):";

pub struct QueryExpander {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
    max_variants: usize,
}

impl QueryExpander {
    pub fn new(client: Arc<dyn CompletionClient>, temperature: f32, max_variants: usize) -> Self {
        Self {
            client,
            temperature,
            max_variants,
        }
    }

    /// Produce the query set for retrieval: the original query first,
    /// followed by up to `max_variants` paraphrases.
    ///
    /// Never fails and never returns an empty set.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let mut queries = vec![query.to_string()];

        match self.generate_variants(query).await {
            Ok(variants) => {
                debug!(count = variants.len(), "generated query variants");
                queries.extend(variants);
            }
            Err(e) => {
                warn!(error = %e, "query expansion failed, using original query only");
            }
        }

        queries
    }

    async fn generate_variants(&self, query: &str) -> Result<Vec<String>> {
        let prompt = MULTI_QUERY_PROMPT.replace("{question}", query);
        let response = self.client.complete(&prompt, self.temperature).await?;

        let variants: Vec<String> = response
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .take(self.max_variants)
            .collect();

        Ok(variants)
    }
}
