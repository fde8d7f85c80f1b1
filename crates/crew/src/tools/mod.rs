//! External capabilities an agent may call while working on a task.
//!
//! Tools are shared read-only across agents (`Arc<dyn Tool>`); every call
//! goes through the [`ToolInvoker`], which bounds its duration and folds
//! every failure into `ToolUnavailable` or `ToolTimeout`.

mod invoker;
pub mod search;

use async_trait::async_trait;
use crewline_common::Result;

pub use invoker::ToolInvoker;
pub use search::{SearchConfig, SerperSearchTool};

/// A capability callable by an agent: query string in, result string out.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses to request this tool.
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    async fn invoke(&self, query: &str) -> Result<String>;
}
