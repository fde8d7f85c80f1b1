//! Task definition.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crewline_common::Result;

use crate::agent::{Agent, AgentId};
use crate::template::interpolate;
use crate::tools::Tool;

/// A unit of work bound to one agent.
#[derive(Clone)]
pub struct Task {
    description: String,
    expected_output: String,
    agent: AgentId,
    tools: Vec<Arc<dyn Tool>>,
    async_execution: bool,
    output_file: Option<PathBuf>,
    context: Option<Vec<usize>>,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: &Agent,
    ) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent.id().to_string(),
            tools: Vec::new(),
            async_execution: false,
            output_file: None,
            context: None,
        }
    }

    /// Tools for this task only. When set they replace the agent's own tools.
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_async_execution(mut self, value: bool) -> Self {
        self.async_execution = value;
        self
    }

    /// Persist the final output to `path`, overwriting it on every run.
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Use the outputs of these earlier tasks (by index) as context instead
    /// of the previous task's output.
    pub fn with_context(mut self, task_indices: impl IntoIterator<Item = usize>) -> Self {
        self.context = Some(task_indices.into_iter().collect());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    pub fn agent_id(&self) -> &str {
        &self.agent
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn async_execution(&self) -> bool {
        self.async_execution
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn context(&self) -> Option<&[usize]> {
        self.context.as_deref()
    }

    pub(crate) fn interpolate(&self, inputs: &HashMap<String, String>) -> Self {
        Self {
            description: interpolate(&self.description, inputs),
            expected_output: interpolate(&self.expected_output, inputs),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("description", &self.description)
            .field("expected_output", &self.expected_output)
            .field("agent", &self.agent)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("async_execution", &self.async_execution)
            .field("output_file", &self.output_file)
            .field("context", &self.context)
            .finish()
    }
}

/// Write `content` to `path`, creating parent directories and replacing any
/// existing file.
pub(crate) async fn write_output_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
