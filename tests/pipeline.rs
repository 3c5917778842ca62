//! End-to-end chat turns over the full pipeline with a scripted completion
//! client and the in-memory index.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docchat::config::Config;
use docchat::index::{MemoryIndex, Passage, VectorIndex};
use docchat::llm::CompletionClient;
use docchat::message::{HistoryTurn, Role};
use docchat::pipeline::{Pipeline, NO_CONTEXT_ANSWER};

/// Recognizes each stage's prompt and records what it was asked.
struct ScriptedClient {
    condensed: String,
    variants: String,
    answer: String,
    generation_prompts: Mutex<Vec<String>>,
    generation_calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(condensed: &str, variants: &str, answer: &str) -> Self {
        Self {
            condensed: condensed.to_string(),
            variants: variants.to_string(),
            answer: answer.to_string(),
            generation_prompts: Mutex::new(Vec::new()),
            generation_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
        if prompt.contains("Standalone question:") {
            Ok(self.condensed.clone())
        } else if prompt.contains("Generated Queries") {
            Ok(self.variants.clone())
        } else if prompt.contains("Top 5 Indices") {
            Ok("0, 1, 2, 3, 4".to_string())
        } else {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            self.generation_prompts
                .lock()
                .unwrap()
                .push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }
}

/// Index wrapper that records every similarity query issued.
struct RecordingIndex {
    inner: MemoryIndex,
    queries: Mutex<Vec<String>>,
}

impl RecordingIndex {
    fn new() -> Self {
        Self {
            inner: MemoryIndex::new(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn collection_exists(&self, session_id: &str) -> Result<bool> {
        self.inner.collection_exists(session_id).await
    }

    async fn query(&self, session_id: &str, text: &str, top_k: usize) -> Result<Vec<Passage>> {
        self.queries.lock().unwrap().push(text.to_string());
        self.inner.query(session_id, text, top_k).await
    }

    async fn add_passages(&self, session_id: &str, passages: Vec<Passage>) -> Result<()> {
        self.inner.add_passages(session_id, passages).await
    }
}

fn pipeline(client: Arc<ScriptedClient>, index: Arc<dyn VectorIndex>) -> Pipeline {
    Pipeline::new(&Config::default(), client.clone(), client, index)
}

#[tokio::test]
async fn single_turn_question_over_a_contract() {
    let index = Arc::new(MemoryIndex::new());
    index
        .add_passages(
            "sess-1",
            vec![
                Passage::new(
                    "Section 9: Termination. Either party may terminate with 30 days written notice.",
                    "contract.pdf",
                ),
                Passage::new("Quarterly invoices must be submitted electronically.", "contract.pdf"),
            ],
        )
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(
        "",
        "termination clause, ending the agreement, contract termination terms",
        "The contract can be terminated by either party with 30 days written notice (Section 9).",
    ));

    let turn = pipeline(client.clone(), index)
        .handle_chat_turn("What is the termination clause?", "sess-1", &[])
        .await
        .unwrap();

    assert!(turn.answer.contains("terminate"));
    assert_eq!(turn.sources.len(), 1);
    assert!(turn.sources[0].starts_with("Source: contract.pdf"));
    assert!(turn.sources[0].contains("Section 9"));
    assert!(turn.sources[0].ends_with("..."));
    assert_eq!(client.generation_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn follow_up_turn_retrieves_with_the_condensed_question() {
    let index = Arc::new(RecordingIndex::new());
    index
        .add_passages(
            "sess-1",
            vec![Passage::new(
                "A penalty of 5% applies if the March 1 deadline is missed.",
                "terms.md",
            )],
        )
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(
        "What is the penalty for missing the March 1 deadline?",
        "",
        "A 5% penalty applies.",
    ));

    let history = vec![
        HistoryTurn::new(Role::User, "What is the deadline?"),
        HistoryTurn::new(Role::Assistant, "March 1"),
    ];

    let turn = pipeline(client.clone(), index.clone())
        .handle_chat_turn("And the penalty for missing it?", "sess-1", &history)
        .await
        .unwrap();

    assert_eq!(turn.answer, "A 5% penalty applies.");

    // Retrieval saw the standalone question, with the pronoun resolved.
    let queries = index.queries.lock().unwrap();
    assert!(!queries.is_empty());
    for q in queries.iter() {
        assert!(q.contains("deadline") && q.contains("penalty"), "query: {}", q);
    }

    // Generation saw the original follow-up and the full transcript.
    let prompts = client.generation_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("And the penalty for missing it?"));
    assert!(prompts[0].contains("assistant: March 1"));
}

#[tokio::test]
async fn turn_without_any_ingested_passages_short_circuits() {
    let client = Arc::new(ScriptedClient::new("", "", "should never be produced"));
    let index = Arc::new(MemoryIndex::new());

    let turn = pipeline(client.clone(), index)
        .handle_chat_turn("What is the warranty?", "sess-unknown", &[])
        .await
        .unwrap();

    assert_eq!(turn.answer, NO_CONTEXT_ANSWER);
    assert!(turn.sources.is_empty());
    assert_eq!(client.generation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn turn_with_no_matching_passages_short_circuits() {
    let index = Arc::new(MemoryIndex::new());
    index
        .add_passages(
            "sess-1",
            vec![Passage::new("Payment terms and schedules.", "contract.pdf")],
        )
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new("", "", "should never be produced"));

    // Nothing in the collection overlaps the query terms.
    let turn = pipeline(client.clone(), index)
        .handle_chat_turn("zebra migration", "sess-1", &[])
        .await
        .unwrap();

    assert_eq!(turn.answer, NO_CONTEXT_ANSWER);
    assert!(turn.sources.is_empty());
    assert_eq!(client.generation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_hits_across_variants_collapse_into_one_source() {
    // Both the original query and the variant match the same single
    // passage; the context (and thus the citations) must contain it once.
    let index = Arc::new(MemoryIndex::new());
    index
        .add_passages(
            "sess-1",
            vec![Passage::new(
                "The warranty covers manufacturing defects for two years.",
                "warranty.txt",
            )],
        )
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(
        "",
        "warranty coverage, defect coverage period",
        "Two years for manufacturing defects.",
    ));

    let turn = pipeline(client, index)
        .handle_chat_turn("What does the warranty cover?", "sess-1", &[])
        .await
        .unwrap();

    assert_eq!(turn.sources.len(), 1);
}
