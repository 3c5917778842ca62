use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings for the external generation service.
///
/// Two model identifiers are used: a lightweight model for question
/// condensation, query expansion, and re-ranking, and a stronger model
/// for final answer generation.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_light_model")]
    pub light_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_expand_temperature")]
    pub expand_temperature: f32,
    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            light_model: default_light_model(),
            answer_model: default_answer_model(),
            expand_temperature: default_expand_temperature(),
            answer_temperature: default_answer_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_light_model() -> String {
    "models/gemini-flash-latest".to_string()
}
fn default_answer_model() -> String {
    "models/gemini-2.5-pro".to_string()
}
fn default_expand_temperature() -> f32 {
    0.7
}
fn default_answer_temperature() -> f32 {
    0.3
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index per query variant.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum passages surviving the re-ranking stage.
    #[serde(default = "default_rerank_limit")]
    pub rerank_limit: usize,
    /// Paraphrased query variants requested from the expander.
    #[serde(default = "default_expansion_count")]
    pub expansion_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rerank_limit: default_rerank_limit(),
            expansion_count: default_expansion_count(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_rerank_limit() -> usize {
    5
}
fn default_expansion_count() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7400".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be > 0");
    }
    if config.retrieval.rerank_limit == 0 {
        anyhow::bail!("retrieval.rerank_limit must be > 0");
    }

    // Validate llm
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }
    for (name, t) in [
        ("llm.expand_temperature", config.llm.expand_temperature),
        ("llm.answer_temperature", config.llm.answer_temperature),
    ] {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("{} must be in [0.0, 2.0]", name);
        }
    }

    Ok(config)
}
