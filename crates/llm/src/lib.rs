//! Provider-neutral LLM access for crewline.
//!
//! ```text
//! build_llm_client(&LlmConfig)
//!      │
//!      ▼
//! SemaphoredClient ── caps concurrent requests across all runs
//!      │
//!      ▼
//! RetryingClient ──── exponential backoff on transient errors only
//!      │
//!      ▼
//! OpenAiClient | AnthropicClient
//! ```

pub mod anthropic;
pub mod client;
pub mod config;
mod http;
pub mod limit;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{build_llm_client, LlmConfig, Provider};
pub use limit::SemaphoredClient;
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
