//! The per-turn orchestration pipeline.
//!
//! [`Pipeline`] is the coordinator: the only component with cross-stage
//! knowledge. One chat turn moves through
//!
//! ```text
//! received → condensed → retrieved → answered | no-context → done
//! ```
//!
//! Retrieval runs with the condensed standalone question; generation runs
//! with the user's original question. Every envelope in a turn carries the
//! trace id minted when the turn was received.
//!
//! Condenser and generator failures fail the turn; expansion and ranking
//! degrade inside the retriever without surfacing here.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::condense::Condenser;
use crate::config::Config;
use crate::expand::QueryExpander;
use crate::generate::Generator;
use crate::index::VectorIndex;
use crate::llm::{CompletionClient, GeminiClient};
use crate::message::{Envelope, HistoryTurn, MessageKind, Payload};
use crate::rank::Ranker;
use crate::retrieve::Retriever;

/// Fixed answer for turns where retrieval produced no context.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant information in the uploaded documents.";

const COORDINATOR: &str = "coordinator";
const CONDENSER: &str = "condenser";
const RETRIEVER: &str = "retriever";
const GENERATOR: &str = "generator";

/// The caller-facing result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub answer: String,
    pub sources: Vec<String>,
}

pub struct Pipeline {
    condenser: Condenser,
    retriever: Retriever,
    generator: Generator,
}

impl Pipeline {
    /// Assemble the pipeline from explicit collaborators.
    ///
    /// `light` serves condensation, expansion, and re-ranking; `answer`
    /// serves final generation.
    pub fn new(
        config: &Config,
        light: Arc<dyn CompletionClient>,
        answer: Arc<dyn CompletionClient>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let expander = QueryExpander::new(
            light.clone(),
            config.llm.expand_temperature,
            config.retrieval.expansion_count,
        );
        let ranker = Ranker::new(light.clone(), config.retrieval.rerank_limit);

        Self {
            condenser: Condenser::new(light),
            retriever: Retriever::new(index, expander, ranker, config.retrieval.top_k),
            generator: Generator::new(answer, config.llm.answer_temperature),
        }
    }

    /// Assemble the pipeline with Gemini completion clients from config.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let light = Arc::new(GeminiClient::new(&config.llm, &config.llm.light_model)?);
        let answer = Arc::new(GeminiClient::new(&config.llm, &config.llm.answer_model)?);
        Ok(Self::new(config, light, answer, index))
    }

    /// Run one chat turn end to end.
    ///
    /// Returns the grounded answer and its source citations, or the fixed
    /// no-context answer with empty sources when the session has nothing
    /// relevant. Errors are turn-level failures with no partial answer.
    pub async fn handle_chat_turn(
        &self,
        query: &str,
        session_id: &str,
        history: &[HistoryTurn],
    ) -> Result<ChatTurn> {
        let trace_id = Uuid::new_v4().to_string();
        info!(trace_id = %trace_id, session_id, "chat turn received");

        // Condense the follow-up into a standalone question.
        let mut payload = Payload::with_session(session_id);
        payload.query = Some(query.to_string());
        payload.history = Some(history.to_vec());
        let condense_request = Envelope::new(
            COORDINATOR,
            CONDENSER,
            MessageKind::CondenseRequest,
            &trace_id,
            payload,
        );
        let standalone = self.condenser.handle(&condense_request).await?;

        // Retrieve with the standalone question, not the original.
        let mut payload = Payload::with_session(session_id);
        payload.query = Some(standalone);
        let retrieval_request = Envelope::new(
            COORDINATOR,
            RETRIEVER,
            MessageKind::RetrievalRequest,
            &trace_id,
            payload,
        );
        let context_response = self.retriever.handle(&retrieval_request).await?;
        let context = context_response.payload.require_context()?;

        if context.is_empty() {
            info!(trace_id = %trace_id, "no context retrieved, short-circuiting turn");
            return Ok(ChatTurn {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        // Generate with the original question and full history.
        let mut payload = Payload::with_session(session_id);
        payload.query = Some(query.to_string());
        payload.context = Some(context.to_vec());
        payload.history = Some(history.to_vec());
        let generation_request = Envelope::new(
            COORDINATOR,
            GENERATOR,
            MessageKind::GenerationRequest,
            &trace_id,
            payload,
        );
        let final_response = self.generator.handle(&generation_request).await?;

        info!(trace_id = %trace_id, "chat turn answered");

        Ok(ChatTurn {
            answer: final_response
                .payload
                .answer
                .unwrap_or_default(),
            sources: final_response.payload.sources.unwrap_or_default(),
        })
    }
}
