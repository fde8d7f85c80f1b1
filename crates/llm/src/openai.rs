//! OpenAI-compatible chat completions (`POST {base}/v1/chat/completions`).
//!
//! Any server speaking this format works (OpenAI, Ollama, vLLM, ...); the key
//! is optional so keyless local endpoints can be used.

use async_trait::async_trait;
use crewline_common::{CrewError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
use crate::http::{classify_transport, read_json};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const PROVIDER: &str = "OpenAI";

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> ChatCompletionBody<'a> {
    /// The system prompt travels as the first message.
    fn new(model: &'a str, request: &'a LlmRequest) -> Self {
        let system = request.system_prompt.as_deref().map(|content| WireMessage {
            role: Role::System,
            content,
        });
        let turns = request.messages.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        });

        Self {
            model,
            messages: system.into_iter().chain(turns).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

impl ChatCompletion {
    fn into_response(self) -> Result<LlmResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CrewError::LlmRequest(format!("{PROVIDER} response had no choices")))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: self.model,
            usage: self.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
        })
    }
}

pub struct OpenAiClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model: model.into(),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    /// Replace the HTTP client, e.g. one built with a request timeout.
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = ChatCompletionBody::new(&self.model, &request);
        debug!(model = %self.model, messages = body.messages.len(), "Calling chat completions");

        let mut http_request = self.http_client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, e))?;

        read_json::<ChatCompletion>(PROVIDER, response)
            .await?
            .into_response()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
