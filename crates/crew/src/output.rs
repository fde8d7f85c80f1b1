use std::fmt;

use crewline_llm::TokenUsage;
use serde::Serialize;

/// Result of a single completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    /// Position of the task in the crew's task list.
    pub index: usize,
    pub agent_role: String,
    pub description: String,
    /// Final text produced for the task.
    pub raw: String,
    pub usage: TokenUsage,
}

/// Result of a whole run. `raw` is the last task's output.
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutput {
    pub raw: String,
    /// One entry per task, in task-list order.
    pub tasks_output: Vec<TaskOutput>,
    pub usage: TokenUsage,
}

impl CrewOutput {
    pub(crate) fn from_tasks(tasks_output: Vec<TaskOutput>) -> Self {
        let mut usage = TokenUsage::default();
        for output in &tasks_output {
            usage += output.usage;
        }
        let raw = tasks_output
            .last()
            .map(|o| o.raw.clone())
            .unwrap_or_default();

        Self {
            raw,
            tasks_output,
            usage,
        }
    }
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
