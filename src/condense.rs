//! Standalone-question rewriting.
//!
//! A follow-up like "And the penalty for missing it?" is useless as a
//! retrieval query on its own. The condenser rewrites it into a
//! self-contained question using the conversation transcript, so the
//! retriever sees the actual topic instead of unresolved pronouns.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::llm::CompletionClient;
use crate::message::{format_history, Envelope, HistoryTurn};

const CONDENSE_PROMPT: &str = "\
Given the following conversation and a follow-up question, rephrase the \
follow-up question to be a standalone question that can be understood \
without the chat history.

Chat History:
{chat_history}

Follow Up Input: {question}
Standalone question:";

pub struct Condenser {
    client: Arc<dyn CompletionClient>,
}

impl Condenser {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Handle a condense request envelope.
    ///
    /// A missing query is a contract violation and fails the turn. Absent
    /// history is treated as an empty transcript.
    pub async fn handle(&self, request: &Envelope) -> Result<String> {
        let query = request.payload.require_query()?;
        let history = request.payload.history.as_deref().unwrap_or(&[]);
        self.condense(query, history).await
    }

    /// Rewrite `query` into a standalone question.
    ///
    /// With empty history the query is already standalone and is returned
    /// as-is without a model call. Otherwise exactly one completion call is
    /// made; its failure fails the turn — continuing with a poorly formed
    /// question would silently degrade answer quality.
    pub async fn condense(&self, query: &str, history: &[HistoryTurn]) -> Result<String> {
        if history.is_empty() {
            return Ok(query.to_string());
        }

        let prompt = CONDENSE_PROMPT
            .replace("{chat_history}", &format_history(history))
            .replace("{question}", query);

        let standalone = self.client.complete(&prompt, 0.0).await?;
        let standalone = standalone.trim().to_string();
        debug!(standalone = %standalone, "condensed follow-up question");
        Ok(standalone)
    }
}
