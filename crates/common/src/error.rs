//! Error types for crewline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrewError {
    #[error("Invalid agent configuration: {0}")]
    InvalidAgentConfig(String),

    #[error("Invalid crew configuration: {0}")]
    InvalidCrewConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tool '{tool}' unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("LLM rejected credentials: {0}")]
    LlmAuth(String),

    /// Rate limiting, server errors and transport failures. The only retryable kind.
    #[error("Transient LLM error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    LlmTransient {
        status: Option<u16>,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("LLM request error: {0}")]
    LlmRequest(String),

    #[error("LLM unavailable after {attempts} attempts: {last_error}")]
    LlmUnavailable { attempts: u32, last_error: String },

    #[error("Task {index} failed: {source}")]
    TaskExecutionFailed {
        index: usize,
        #[source]
        source: Box<CrewError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrewError {
    pub fn task_failed(index: usize, source: CrewError) -> Self {
        CrewError::TaskExecutionFailed {
            index,
            source: Box::new(source),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CrewError::LlmTransient { .. })
    }

    /// Tool failures let the agent carry on without the tool's output.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            CrewError::ToolUnavailable { .. } | CrewError::ToolTimeout { .. }
        )
    }

    /// Innermost error, looking through `TaskExecutionFailed` wrappers.
    pub fn root_cause(&self) -> &CrewError {
        match self {
            CrewError::TaskExecutionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrewError>;
