//! Server configuration.
//!
//! Every field has a default, so the file is optional. Credentials are
//! resolved after loading: a value in the file wins, otherwise the
//! provider's environment variable is used.

use std::path::{Path, PathBuf};

use crewline_common::Result;
use crewline_crew::{CrewConfig, SearchConfig};
use crewline_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub crew: CrewSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewSettings {
    /// LLM turns an agent may spend on one task.
    pub max_iterations: u32,
    /// Where the writer's article is saved. Overwritten on every run.
    pub output_file: PathBuf,
}

impl Default for CrewSettings {
    fn default() -> Self {
        Self {
            max_iterations: CrewConfig::default().max_iterations,
            output_file: PathBuf::from("new-blog-post.md"),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {e}", path.display()))?;
        let config: Self = toml::from_str(&content)?;

        if config.llm.api_key.is_some() || config.search.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. Prefer environment variables \
                 (OPENAI_API_KEY, ANTHROPIC_API_KEY, SERPER_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Fill in missing LLM and search credentials from `lookup`.
    ///
    /// Fails on the first credential that cannot be found.
    pub fn resolve_credentials_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.llm.resolve_api_key_with(&lookup)?;
        self.search.resolve_api_key_with(&lookup)
    }

    /// Engine settings for one crew run. Tool calls are bounded by the
    /// search timeout.
    pub fn crew_config(&self) -> CrewConfig {
        CrewConfig {
            max_iterations: self.crew.max_iterations,
            tool_timeout_ms: self.search.timeout_ms,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }
}
