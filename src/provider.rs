//! Client for OpenAI-compatible `/chat/completions` endpoints (Perplexity by default).
//!
//! One non-streaming round trip per call. Wire types stay private to this module.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::CompletionConfig;
use crate::domain::CompletionProvider;
use crate::errors::ProviderError;

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsProvider {
    /// No request timeout is set; a hung call is bounded only by the transport.
    pub fn new(config: &CompletionConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn payload<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: [
                Message { role: "system", content: system_prompt },
                Message { role: "user", content: user_prompt },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            stream: false,
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        let payload = self.payload(system_prompt, user_prompt);
        debug!(model = %self.model, prompt_len = user_prompt.len(), "sending completion request");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_url, error = %e, "completion request failed (transport)");
                ProviderError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "completion API returned an error status");
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        debug!(choices = parsed.choices.len(), "received completion response");
        first_content(parsed)
    }
}

fn first_content(parsed: ChatCompletionResponse) -> Result<String, ProviderError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(ProviderError::EmptyResponse)
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
