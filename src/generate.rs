//! Grounded answer generation.
//!
//! Renders one prompt from the conversation transcript, the labeled context
//! passages, and the user's original question, and asks the answer model
//! for a response. Generation runs at a lower temperature than expansion —
//! faithfulness to the context matters more than diversity here.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::llm::CompletionClient;
use crate::message::{format_history, Envelope, HistoryTurn, MessageKind, Payload};

const ANSWER_PROMPT: &str = "\
You are a helpful assistant. Use the following context and chat history to \
answer the question.
Each piece of context is preceded by its source document. Pay close \
attention to this source information.

CHAT HISTORY:
{chat_history}

CONTEXT:
{context}

QUESTION:
{question}

Based on the chat history and the context provided (including the source of \
each piece of context), please provide a clear and concise answer. If the \
context does not contain the answer, state that the information is not \
available in the provided documents.";

/// Passages are joined with this delimiter in the prompt.
const CONTEXT_DELIMITER: &str = "\n---\n";

/// Length of the cited prefix taken from each context passage.
const SOURCE_PREFIX_CHARS: usize = 100;

/// The generator's output: the answer text plus lightweight citations.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

pub struct Generator {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }

    /// Handle a generation request envelope, answering with a final
    /// response under the same trace id.
    ///
    /// Both query and context are required payload fields; an empty
    /// context sequence is valid (the coordinator normally short-circuits
    /// before that), an absent one is a contract violation.
    pub async fn handle(&self, request: &Envelope) -> Result<Envelope> {
        let query = request.payload.require_query()?;
        let context = request.payload.require_context()?;
        let history = request.payload.history.as_deref().unwrap_or(&[]);

        let generated = self.generate(query, context, history).await?;

        let mut payload = Payload {
            session: request.payload.session.clone(),
            query: Some(query.to_string()),
            context: Some(context.to_vec()),
            ..Default::default()
        };
        payload.answer = Some(generated.answer);
        payload.sources = Some(generated.sources);

        Ok(Envelope::new(
            &request.receiver,
            &request.sender,
            MessageKind::FinalResponse,
            &request.trace_id,
            payload,
        ))
    }

    /// Answer `query` from `context` and `history`.
    ///
    /// Exactly one completion call; its failure fails the turn — an answer
    /// that silently lost its grounding would be worse than a visible
    /// error. `sources` are derived deterministically from the context
    /// passages, not from the model output.
    pub async fn generate(
        &self,
        query: &str,
        context: &[String],
        history: &[HistoryTurn],
    ) -> Result<GeneratedAnswer> {
        let prompt = ANSWER_PROMPT
            .replace("{chat_history}", &format_history(history))
            .replace("{context}", &context.join(CONTEXT_DELIMITER))
            .replace("{question}", query);

        let answer = self.client.complete(&prompt, self.temperature).await?;
        debug!(context_passages = context.len(), "generated answer");

        Ok(GeneratedAnswer {
            answer: answer.trim().to_string(),
            sources: context.iter().map(|c| cite(c)).collect(),
        })
    }
}

/// A citation surrogate: the passage's first characters plus an ellipsis
/// marker. Not a verified quotation.
fn cite(passage: &str) -> String {
    let prefix: String = passage.chars().take(SOURCE_PREFIX_CHARS).collect();
    format!("{}...", prefix)
}
