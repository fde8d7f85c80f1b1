use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crewline_common::{CrewError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anthropic::AnthropicClient;
use crate::client::LlmClient;
use crate::limit::SemaphoredClient;
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};

/// Supported chat-completion backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI or any server exposing the same chat completions API.
    #[default]
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Environment variable holding this provider's credential.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-sonnet-4-5",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        })
    }
}

/// `[llm]` section. The credential is read from the environment at startup
/// and never written back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Empty means the provider's default model.
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL for OpenAI-compatible servers, full messages URL for Anthropic.
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: String::new(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: 120_000,
            max_concurrent_requests: 2,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn model_or_default(&self) -> &str {
        match self.model.trim() {
            "" => self.provider.default_model(),
            model => model,
        }
    }

    /// Keep a non-blank configured key, otherwise look up the provider's
    /// variable. A blank value counts as missing.
    pub fn resolve_api_key_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            return Ok(());
        }

        let var = self.provider.api_key_env_var();
        let key = lookup(var).filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            CrewError::Config(format!(
                "{var} is not set; the {} provider needs a credential",
                self.provider
            ))
        })?;
        self.api_key = Some(key);
        Ok(())
    }
}

/// Provider client wrapped in retries and a shared concurrency cap.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()
        .map_err(|e| CrewError::Config(format!("Failed to build HTTP client: {e}")))?;
    let model = config.model_or_default().to_string();

    let provider_client: Box<dyn LlmClient> = match config.provider {
        Provider::OpenAi => Box::new(
            OpenAiClient::new(config.api_url.clone(), model, config.api_key.clone())
                .with_http_client(http_client),
        ),
        Provider::Anthropic => {
            let Some(api_key) = config.api_key.clone() else {
                return Err(CrewError::Config(format!(
                    "{} is not set; the anthropic provider needs a credential",
                    Provider::Anthropic.api_key_env_var()
                )));
            };
            let client = AnthropicClient::new(model, api_key).with_http_client(http_client);
            match &config.api_url {
                Some(url) => Box::new(client.with_api_url(url.clone())),
                None => Box::new(client),
            }
        }
    };

    info!(
        provider = %config.provider,
        model = provider_client.model_name(),
        max_retries = config.retry.max_retries,
        max_concurrent = config.max_concurrent_requests,
        "LLM client ready"
    );

    let retrying = RetryingClient::new(provider_client, config.retry.clone());
    Ok(Arc::new(SemaphoredClient::new(
        Arc::new(retrying),
        config.max_concurrent_requests,
    )))
}
