//! # docchat
//!
//! A session-scoped document QA service: natural-language questions are
//! answered from a user's uploaded passages by combining multi-query
//! retrieval with grounded generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌──────────────────────────┐
//! │ Coordinator │──▶│ Condenser │──▶│        Retriever         │
//! │  (pipeline) │   └───────────┘   │ expand ─▶ index ─▶ rank  │
//! └──────┬──────┘                   └────────────┬─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                        ┌──────────────┐
//! │  Generator  │◀───── labeled context ─┤ VectorIndex  │
//! └─────────────┘                        └──────────────┘
//! ```
//!
//! Each arrow is a synchronous request/response carried as a
//! [`message::Envelope`]; all envelopes in one chat turn share a trace id.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`message`] | Inter-stage envelope contract |
//! | [`llm`] | Completion client abstraction (Gemini) |
//! | [`index`] | Vector index abstraction + in-memory backend |
//! | [`condense`] | Standalone-question rewriting |
//! | [`expand`] | Multi-query expansion |
//! | [`retrieve`] | Fan-out, dedup, provenance labeling |
//! | [`rank`] | Relevance re-ranking |
//! | [`generate`] | Grounded answer generation |
//! | [`pipeline`] | Per-turn coordinator |
//! | [`server`] | HTTP API |

pub mod condense;
pub mod config;
pub mod expand;
pub mod generate;
pub mod index;
pub mod llm;
pub mod message;
pub mod pipeline;
pub mod rank;
pub mod retrieve;
pub mod server;
