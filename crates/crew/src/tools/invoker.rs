use std::time::Duration;

use crewline_common::{CrewError, Result};
use tracing::debug;

use super::Tool;

/// Calls tools under a bounded wait and normalizes their failures.
#[derive(Debug, Clone, Copy)]
pub struct ToolInvoker {
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn invoke(&self, tool: &dyn Tool, query: &str) -> Result<String> {
        debug!(tool = %tool.name(), query_len = query.len(), "Invoking tool");

        match tokio::time::timeout(self.timeout, tool.invoke(query)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.is_tool_failure() => Err(e),
            Ok(Err(e)) => Err(CrewError::ToolUnavailable {
                tool: tool.name().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(CrewError::ToolTimeout {
                tool: tool.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
