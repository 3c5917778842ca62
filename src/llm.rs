//! Completion client abstraction and the Gemini implementation.
//!
//! Defines the [`CompletionClient`] trait that every pipeline stage uses for
//! its external generation calls, and [`GeminiClient`], which calls the
//! Google Generative Language REST API with retry and backoff.
//!
//! A client is bound to one model at construction. The pipeline holds two
//! instances: a lightweight model for condensation, expansion, and
//! re-ranking, and a stronger model for final answer generation.
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

/// A synchronous-per-call text completion service.
///
/// `temperature` controls sampling randomness; callers pick lower values
/// when faithfulness matters more than diversity. Implementations must be
/// `Send + Sync` so stages can share them across tasks.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete `prompt` and return the model's text output.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Completion client for the Google Generative Language API.
///
/// Calls `POST {api_base}/{model}:generateContent`. Requires the
/// `GEMINI_API_KEY` environment variable to be set.
pub struct GeminiClient {
    api_base: String,
    model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client bound to `model` (e.g. `"models/gemini-flash-latest"`).
    ///
    /// # Errors
    ///
    /// Returns an error if `GEMINI_API_KEY` is not in the environment or
    /// the HTTP client cannot be built.
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        if std::env::var("GEMINI_API_KEY").is_err() {
            bail!("GEMINI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.api_base, self.model, api_key
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature },
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_gemini_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Gemini API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Extract the first candidate's text from a `generateContent` response.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Gemini response: empty candidate text");
    }

    Ok(text)
}
