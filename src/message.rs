//! The typed message contract between pipeline stages.
//!
//! Every stage of the chat pipeline consumes and produces an [`Envelope`]:
//! a routed, trace-correlated wrapper around a [`Payload`]. Envelopes are
//! turn-local — they are built for one stage exchange and discarded once the
//! next stage has consumed them.
//!
//! The payload is a bag of optional fields; which fields are present depends
//! on the stage. A stage that needs a field calls the corresponding
//! `require_*` accessor, and an absent required field is a contract
//! violation that fails the whole turn.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Speaker of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One prior message in the conversation, oldest first in any sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The kind of exchange an [`Envelope`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    CondenseRequest,
    RetrievalRequest,
    ContextResponse,
    GenerationRequest,
    FinalResponse,
}

/// Stage-to-stage data carrier.
///
/// Fields are optional because each stage populates only what the next
/// stage needs; nothing is ever silently defaulted. `session` must carry
/// a `session_id` entry for any stage that touches the vector index.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub session: HashMap<String, String>,
    pub query: Option<String>,
    pub context: Option<Vec<String>>,
    pub answer: Option<String>,
    pub sources: Option<Vec<String>>,
    pub history: Option<Vec<HistoryTurn>>,
}

impl Payload {
    pub fn with_session(session_id: &str) -> Self {
        let mut session = HashMap::new();
        session.insert("session_id".to_string(), session_id.to_string());
        Self {
            session,
            ..Default::default()
        }
    }

    pub fn require_query(&self) -> Result<&str> {
        self.query
            .as_deref()
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow!("payload is missing required field: query"))
    }

    pub fn require_context(&self) -> Result<&[String]> {
        self.context
            .as_deref()
            .ok_or_else(|| anyhow!("payload is missing required field: context"))
    }

    pub fn require_session_id(&self) -> Result<&str> {
        self.session
            .get("session_id")
            .map(|s| s.as_str())
            .ok_or_else(|| anyhow!("payload is missing required session_id"))
    }
}

/// A routed message between two pipeline stages.
///
/// All envelopes created within one user-facing chat turn share the same
/// `trace_id`, minted by the coordinator when the turn is received.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub receiver: String,
    pub kind: MessageKind,
    pub trace_id: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(
        sender: &str,
        receiver: &str,
        kind: MessageKind,
        trace_id: &str,
        payload: Payload,
    ) -> Self {
        Self {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            kind,
            trace_id: trace_id.to_string(),
            payload,
        }
    }
}

/// Render a history transcript for prompt embedding, oldest turn first.
pub fn format_history(history: &[HistoryTurn]) -> String {
    if history.is_empty() {
        return "No history provided.".to_string();
    }
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}
