//! Analysis client adapter
//!
//! The engine talks to the extraction collaborator through the narrow
//! [`AnalysisClient`] trait; [`OpenAiAnalysisClient`] implements it against
//! any OpenAI-compatible chat-completions endpoint. The adapter owns its own
//! concurrency limit — the engine dispatches one task per chunk and the
//! semaphore here bounds in-flight requests.

use anyhow::{anyhow, Context, Result};
use novel_analyzer_sdk::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::analysis::prompts::{
    aggregation_user_prompt, chunk_user_prompt, AGGREGATION_SYSTEM_PROMPT, CHUNK_SYSTEM_PROMPT,
};
use crate::analysis::types::{ChunkAnalysis, Extraction};
use crate::config::Settings;

/// Extraction collaborator interface
///
/// `analyze_chunk` must be idempotent per call but need not be
/// deterministic. `aggregate` must be total on well-formed input and must
/// not assume any ordering of `partials`.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Extract characters and scenes from one chunk of text
    async fn analyze_chunk(&self, text: &str) -> Result<Extraction>;

    /// Merge partial analyses into one deduplicated extraction
    async fn aggregate(&self, partials: &[ChunkAnalysis]) -> Result<Extraction>;
}

// ---------------------------------------------------------------------------
// API request/response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Extraction client for OpenAI-compatible chat-completions endpoints
///
/// Uses JSON response format at temperature 0 so the reply parses directly
/// into an [`Extraction`]. Works with any compatible API via
/// `OPENAI_BASE_URL`.
pub struct OpenAiAnalysisClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    limiter: Semaphore,
}

impl OpenAiAnalysisClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: settings.openai_api_key.clone(),
            model: settings.openai_model.clone(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            limiter: Semaphore::new(settings.max_concurrent_requests.max(1)),
        }
    }

    async fn complete(&self, system_prompt: &str, user_prompt: String) -> Result<Extraction> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| anyhow!("Semaphore closed"))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Extraction request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            anyhow::bail!("Extraction API returned {}: {}", status, detail);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to decode extraction response")?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| anyhow!("Extraction response contained no choices"))?;

        parse_extraction(content)
    }
}

/// Parse the model reply, tolerating a fenced code block around the JSON
fn parse_extraction(content: &str) -> Result<Extraction> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(json).with_context(|| {
        format!(
            "Extraction reply was not valid JSON: {}",
            &json.chars().take(200).collect::<String>()
        )
    })
}

#[async_trait]
impl AnalysisClient for OpenAiAnalysisClient {
    async fn analyze_chunk(&self, text: &str) -> Result<Extraction> {
        self.complete(CHUNK_SYSTEM_PROMPT, chunk_user_prompt(text))
            .await
    }

    async fn aggregate(&self, partials: &[ChunkAnalysis]) -> Result<Extraction> {
        if partials.is_empty() {
            return Ok(Extraction::default());
        }
        let partials_json =
            serde_json::to_string_pretty(partials).context("Failed to serialize partials")?;
        self.complete(AGGREGATION_SYSTEM_PROMPT, aggregation_user_prompt(&partials_json))
            .await
    }
}
