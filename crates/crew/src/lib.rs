//! Agent orchestration for crewline.
//!
//! A [`Crew`] owns a list of [`Agent`]s and an ordered list of [`Task`]s.
//! Running it walks the tasks in order; each task's agent converses with the
//! LLM, may call [`Tool`]s through the [`ToolInvoker`], and may hand a
//! sub-task to a coworker when delegation is enabled.
//!
//! ```text
//! Crew::kickoff(inputs)
//!   │ interpolate {placeholders}
//!   ▼
//! for each task ──► AgentExecutor::step ──► LlmClient
//!   │                  │      ▲
//!   │                  │      └── observation (tool result / coworker answer)
//!   │                  ├──► ToolInvoker ──► Tool
//!   │                  └──► Decision::Delegate ──► coworker run
//!   ▼
//! CrewOutput { raw: last task, tasks_output, usage }
//! ```

pub mod agent;
pub mod crew;
mod executor;
pub mod output;
mod prompt;
pub mod task;
pub mod template;
pub mod tools;

pub use agent::{Agent, AgentId};
pub use crew::{Crew, CrewBuilder, CrewConfig, Process};
pub use output::{CrewOutput, TaskOutput};
pub use task::Task;
pub use tools::{SearchConfig, SerperSearchTool, Tool, ToolInvoker};
