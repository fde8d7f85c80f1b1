//! The orchestrator: validates a crew and runs its tasks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crewline_common::{CrewError, Result};
use crewline_llm::{LlmClient, TokenUsage};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::executor::{AgentExecutor, Conversation, Decision};
use crate::output::{CrewOutput, TaskOutput};
use crate::prompt;
use crate::task::{write_output_file, Task};
use crate::tools::ToolInvoker;

/// How tasks are assigned and ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    /// Tasks run in list order, each by its assigned agent.
    #[default]
    Sequential,
    /// Manager-driven assignment. Not supported; rejected by [`CrewBuilder::build`].
    Hierarchical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewConfig {
    /// LLM turns an agent may spend on one task before it must answer.
    pub max_iterations: u32,
    /// Upper bound on a single tool call.
    pub tool_timeout_ms: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            tool_timeout_ms: 30_000,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Default)]
pub struct CrewBuilder {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    process: Process,
    llm: Option<Arc<dyn LlmClient>>,
    config: CrewConfig,
}

impl CrewBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(mut self, config: CrewConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Crew> {
        if self.process == Process::Hierarchical {
            return Err(invalid(
                "hierarchical process is not supported; use sequential",
            ));
        }
        let llm = self
            .llm
            .ok_or_else(|| invalid("crew requires an LLM client"))?;
        if self.agents.is_empty() {
            return Err(invalid("crew requires at least one agent"));
        }
        if self.tasks.is_empty() {
            return Err(invalid("crew requires at least one task"));
        }
        if self.config.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1"));
        }

        ensure_unique_roles(&self.agents)?;

        for (index, task) in self.tasks.iter().enumerate() {
            if !self.agents.iter().any(|a| a.id() == task.agent_id()) {
                return Err(invalid(format!(
                    "task {index} is assigned to an agent that is not a crew member"
                )));
            }
            if let Some(&bad) = task.context().and_then(|c| c.iter().find(|&&i| i >= index)) {
                return Err(invalid(format!(
                    "task {index} uses task {bad} as context; only earlier tasks are allowed"
                )));
            }
        }

        let trailing_async = self
            .tasks
            .iter()
            .rev()
            .take_while(|t| t.async_execution())
            .count();
        if trailing_async > 1 {
            return Err(invalid(
                "a crew may end with at most one asynchronous task",
            ));
        }

        Ok(Crew {
            agents: self.agents,
            tasks: self.tasks,
            process: self.process,
            llm,
            config: self.config,
        })
    }
}

fn invalid(message: impl Into<String>) -> CrewError {
    CrewError::InvalidCrewConfig(message.into())
}

/// A validated group of agents and the tasks they work through.
///
/// A crew holds no per-run state; `kickoff` may be called repeatedly and
/// concurrently.
pub struct Crew {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    process: Process,
    llm: Arc<dyn LlmClient>,
    config: CrewConfig,
}

impl Crew {
    pub fn builder() -> CrewBuilder {
        CrewBuilder::default()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn process(&self) -> Process {
        self.process
    }

    /// Run the crew on a single topic, bound to the `{topic}` placeholder.
    pub async fn run(&self, topic: &str) -> Result<CrewOutput> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(CrewError::InvalidInput("topic must not be empty".into()));
        }
        let inputs = HashMap::from([("topic".to_string(), topic.to_string())]);
        self.kickoff(&inputs).await
    }

    /// Interpolate `inputs` into agents and tasks, then execute every task.
    ///
    /// Roles are checked for uniqueness again after interpolation, since
    /// delegation addresses coworkers by their interpolated role.
    pub async fn kickoff(&self, inputs: &HashMap<String, String>) -> Result<CrewOutput> {
        let agents: Vec<Agent> = self.agents.iter().map(|a| a.interpolate(inputs)).collect();
        ensure_unique_roles(&agents)?;
        let run = Arc::new(RunContext {
            agents,
            llm: Arc::clone(&self.llm),
            invoker: ToolInvoker::new(Duration::from_millis(self.config.tool_timeout_ms)),
            config: self.config.clone(),
        });
        let tasks: Vec<Task> = self.tasks.iter().map(|t| t.interpolate(inputs)).collect();

        info!(
            tasks = tasks.len(),
            agents = run.agents.len(),
            process = ?self.process,
            "Crew run started"
        );

        let outputs = run_sequential(run, tasks).await?;
        let output = CrewOutput::from_tasks(outputs);

        info!(
            result_len = output.raw.len(),
            total_tokens = output.usage.total(),
            "Crew run finished"
        );
        Ok(output)
    }
}

fn ensure_unique_roles(agents: &[Agent]) -> Result<()> {
    let mut roles = HashSet::new();
    for agent in agents {
        if !roles.insert(agent.role().to_lowercase()) {
            return Err(invalid(format!("duplicate agent role '{}'", agent.role())));
        }
    }
    Ok(())
}

/// Shared read-only state for one run; cloned into spawned async tasks.
struct RunContext {
    agents: Vec<Agent>,
    llm: Arc<dyn LlmClient>,
    invoker: ToolInvoker,
    config: CrewConfig,
}

impl RunContext {
    fn executor(&self) -> AgentExecutor<'_> {
        AgentExecutor::new(
            self.llm.as_ref(),
            self.invoker,
            self.config.max_iterations,
            self.config.temperature,
            self.config.max_tokens,
        )
    }

    fn agent_by_id(&self, id: &str) -> Result<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id() == id)
            .ok_or_else(|| CrewError::Internal(format!("agent {id} missing from run")))
    }

    fn agent_by_role(&self, role: &str) -> Result<&Agent> {
        self.agents
            .iter()
            .find(|a| a.role() == role)
            .ok_or_else(|| CrewError::Internal(format!("coworker '{role}' missing from run")))
    }

    fn coworkers_of(&self, agent: &Agent) -> Vec<String> {
        if !agent.allow_delegation() {
            return Vec::new();
        }
        self.agents
            .iter()
            .filter(|a| a.id() != agent.id())
            .map(|a| a.role().to_string())
            .collect()
    }

    /// Run `task` to completion with `agent`, honouring delegation requests.
    async fn execute_task(
        &self,
        index: usize,
        task: &Task,
        context: Option<String>,
    ) -> Result<TaskOutput> {
        let agent = self.agent_by_id(task.agent_id())?;
        let tools = if task.tools().is_empty() {
            agent.tools()
        } else {
            task.tools()
        };
        let coworkers = self.coworkers_of(agent);

        info!(task = index, agent = %agent.role(), "Task started");

        let executor = self.executor();
        let mut conversation = Conversation::new(
            prompt::system_prompt(agent, tools, &coworkers),
            prompt::task_prompt(task.description(), task.expected_output(), context.as_deref()),
        );

        let raw = loop {
            match executor.step(tools, &mut conversation, &coworkers).await? {
                Decision::Execute { output } => break output,
                Decision::Delegate {
                    coworker,
                    task: sub_task,
                    context: sub_context,
                } => {
                    info!(task = index, from = %agent.role(), to = %coworker, "Delegating");
                    let (answer, usage) = self.delegate(&coworker, &sub_task, &sub_context).await?;
                    conversation.add_usage(usage);
                    conversation.observe(prompt::delegation_observation(&coworker, &answer));
                }
            }
        };

        if let Some(path) = task.output_file() {
            write_output_file(path, &raw).await?;
            debug!(task = index, path = %path.display(), "Wrote task output");
        }

        info!(task = index, agent = %agent.role(), output_len = raw.len(), "Task completed");

        Ok(TaskOutput {
            index,
            agent_role: agent.role().to_string(),
            description: task.description().to_string(),
            raw,
            usage: conversation.usage(),
        })
    }

    /// Have `role` answer a delegated sub-task. The coworker may use its own
    /// tools but cannot delegate further.
    async fn delegate(&self, role: &str, task: &str, context: &str) -> Result<(String, TokenUsage)> {
        let coworker = self.agent_by_role(role)?;
        let mut conversation = Conversation::new(
            prompt::system_prompt(coworker, coworker.tools(), &[]),
            prompt::task_prompt(task, prompt::DELEGATED_EXPECTED_OUTPUT, Some(context)),
        );

        match self
            .executor()
            .step(coworker.tools(), &mut conversation, &[])
            .await?
        {
            Decision::Execute { output } => Ok((output, conversation.usage())),
            Decision::Delegate { .. } => Err(CrewError::Internal(
                "delegated work cannot be delegated again".into(),
            )),
        }
    }
}

/// Async tasks still running. Dropping the set aborts them, so an early
/// return from the run never leaves work behind.
#[derive(Default)]
struct PendingTasks(Vec<(usize, JoinHandle<Result<TaskOutput>>)>);

impl PendingTasks {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn contains(&self, index: usize) -> bool {
        self.0.iter().any(|(i, _)| *i == index)
    }

    fn push(&mut self, index: usize, handle: JoinHandle<Result<TaskOutput>>) {
        self.0.push((index, handle));
    }

    /// Wait for every pending task, in list order.
    async fn drain(&mut self) -> Result<Vec<TaskOutput>> {
        let mut outputs = Vec::with_capacity(self.0.len());
        while !self.0.is_empty() {
            let (index, handle) = self.0.remove(0);
            let output = handle
                .await
                .map_err(|e| {
                    CrewError::task_failed(index, CrewError::Internal(format!("async task panicked: {e}")))
                })?
                .map_err(|e| CrewError::task_failed(index, e))?;
            outputs.push(output);
        }
        Ok(outputs)
    }
}

impl Drop for PendingTasks {
    fn drop(&mut self) {
        for (index, handle) in &self.0 {
            if !handle.is_finished() {
                warn!(task = index, "Aborting pending async task");
            }
            handle.abort();
        }
    }
}

async fn run_sequential(run: Arc<RunContext>, tasks: Vec<Task>) -> Result<Vec<TaskOutput>> {
    let mut outputs: Vec<Option<TaskOutput>> = vec![None; tasks.len()];
    let mut pending = PendingTasks::default();
    let mut previous: Option<String> = None;

    for (index, task) in tasks.into_iter().enumerate() {
        let context = match task.context() {
            Some(indices) => {
                if indices.iter().any(|&i| pending.contains(i)) {
                    store(&mut outputs, pending.drain().await?);
                }
                Some(prompt::join_context(
                    indices
                        .iter()
                        .filter_map(|&i| outputs[i].as_ref())
                        .map(|o| o.raw.as_str()),
                ))
            }
            None if !task.async_execution() && !pending.is_empty() => {
                let finished = pending.drain().await?;
                let joined = prompt::join_context(finished.iter().map(|o| o.raw.as_str()));
                store(&mut outputs, finished);
                Some(joined)
            }
            None => previous.clone(),
        };

        if task.async_execution() {
            debug!(task = index, "Spawning async task");
            let run = Arc::clone(&run);
            pending.push(
                index,
                tokio::spawn(async move { run.execute_task(index, &task, context).await }),
            );
            continue;
        }

        let output = run
            .execute_task(index, &task, context)
            .await
            .map_err(|e| CrewError::task_failed(index, e))?;
        previous = Some(output.raw.clone());
        outputs[index] = Some(output);
    }

    store(&mut outputs, pending.drain().await?);

    outputs
        .into_iter()
        .enumerate()
        .map(|(index, output)| {
            output.ok_or_else(|| CrewError::Internal(format!("task {index} produced no output")))
        })
        .collect()
}

fn store(outputs: &mut [Option<TaskOutput>], finished: Vec<TaskOutput>) {
    for output in finished {
        let index = output.index;
        outputs[index] = Some(output);
    }
}
