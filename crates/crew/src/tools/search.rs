//! Web search through the Serper (google.serper.dev) API.

use std::time::Duration;

use async_trait::async_trait;
use crewline_common::{CrewError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::Tool;

const DEFAULT_API_URL: &str = "https://google.serper.dev";
const SEARCH_ENV_VAR: &str = "SERPER_API_KEY";
const TOOL_NAME: &str = "search";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout_ms: 30_000,
            max_results: 10,
        }
    }
}

impl SearchConfig {
    /// Fill `api_key` from `SERPER_API_KEY` unless the config already carries one.
    pub fn resolve_api_key_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            return Ok(());
        }
        match lookup(SEARCH_ENV_VAR).filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                self.api_key = Some(key);
                Ok(())
            }
            None => Err(CrewError::Config(format!(
                "{SEARCH_ENV_VAR} is not set; the search tool needs a credential"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default, rename = "answerBox")]
    answer_box: Option<SerperAnswerBox>,
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperAnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Google search results via Serper, rendered as plain text for the model.
pub struct SerperSearchTool {
    api_url: String,
    api_key: String,
    max_results: usize,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl SerperSearchTool {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| CrewError::Config("Serper search requires an API key".to_string()))?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrewError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
            timeout,
            http_client,
        })
    }

    fn unavailable(reason: impl Into<String>) -> CrewError {
        CrewError::ToolUnavailable {
            tool: TOOL_NAME.to_string(),
            reason: reason.into(),
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> CrewError {
        if error.is_timeout() {
            CrewError::ToolTimeout {
                tool: TOOL_NAME.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            Self::unavailable(format!("search request failed: {error}"))
        }
    }
}

fn format_results(response: &SerperResponse, max_results: usize) -> String {
    let mut sections = Vec::new();

    if let Some(answer) = response
        .answer_box
        .as_ref()
        .and_then(|b| b.answer.as_ref().or(b.snippet.as_ref()))
    {
        sections.push(format!("Answer: {answer}"));
    }

    for result in response.organic.iter().take(max_results) {
        sections.push(format!(
            "Title: {}\nLink: {}\nSnippet: {}",
            result.title, result.link, result.snippet
        ));
    }

    if sections.is_empty() {
        "No results found.".to_string()
    } else {
        sections.join("\n---\n")
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the internet. Input is a search query; returns titles, links and snippets."
    }

    async fn invoke(&self, query: &str) -> Result<String> {
        let url = format!("{}/search", self.api_url);
        debug!(query = %query, "Searching the web");

        let response = self
            .http_client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": self.max_results }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Self::unavailable(format!(
                "search credential rejected ({status})"
            )));
        }
        if !status.is_success() {
            return Err(Self::unavailable(format!("search API returned {status}")));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(format_results(&parsed, self.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn config_for(api_url: String, timeout_ms: u64) -> SearchConfig {
        SearchConfig {
            api_url,
            api_key: Some("serper-test".to_string()),
            timeout_ms,
            max_results: 3,
        }
    }

    /// Accepts connections and never writes a byte back.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn formats_answer_box_and_organic_results() {
        let response: SerperResponse = serde_json::from_str(
            r#"{
                "answerBox": {"answer": "Qubits"},
                "organic": [
                    {"title": "Quantum 101", "link": "https://a.example", "snippet": "Intro"},
                    {"title": "Error correction", "link": "https://b.example", "snippet": "Codes"}
                ]
            }"#,
        )
        .unwrap();

        let text = format_results(&response, 10);
        assert!(text.starts_with("Answer: Qubits"));
        assert!(text.contains("Title: Quantum 101\nLink: https://a.example\nSnippet: Intro"));
        assert_eq!(text.matches("\n---\n").count(), 2);
    }

    #[test]
    fn limits_results_and_handles_empty_responses() {
        let response: SerperResponse = serde_json::from_str(
            r#"{"organic": [
                {"title": "1", "link": "l1", "snippet": "s1"},
                {"title": "2", "link": "l2", "snippet": "s2"},
                {"title": "3", "link": "l3", "snippet": "s3"}
            ]}"#,
        )
        .unwrap();
        let text = format_results(&response, 2);
        assert!(text.contains("Title: 2"));
        assert!(!text.contains("Title: 3"));

        let empty: SerperResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(format_results(&empty, 5), "No results found.");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = SearchConfig::default();
        assert!(matches!(
            SerperSearchTool::new(&config),
            Err(CrewError::Config(_))
        ));
    }

    #[test]
    fn resolve_api_key_reads_serper_variable() {
        let mut config = SearchConfig::default();
        config
            .resolve_api_key_with(|var| (var == "SERPER_API_KEY").then(|| "k".to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k"));

        let mut config = SearchConfig::default();
        assert!(config.resolve_api_key_with(|_| None).is_err());
    }

    #[tokio::test]
    async fn unresponsive_backend_times_out() {
        let base = silent_server().await;
        let tool = SerperSearchTool::new(&config_for(base, 200)).unwrap();

        let started = Instant::now();
        let err = tool.invoke("quantum computing").await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(
            matches!(err, CrewError::ToolTimeout { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tool = SerperSearchTool::new(&config_for(format!("http://{addr}"), 2_000)).unwrap();
        let err = tool.invoke("quantum computing").await.unwrap_err();
        assert!(
            matches!(err, CrewError::ToolUnavailable { .. }),
            "unexpected error: {err:?}"
        );
    }
}
