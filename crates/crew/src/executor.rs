//! The per-task agent loop: prompt, parse, act, observe.

use std::sync::Arc;

use crewline_common::{CrewError, Result};
use crewline_llm::{ChatMessage, LlmClient, LlmRequest, TokenUsage};
use tracing::{debug, warn};

use crate::prompt::{self, AgentAction};
use crate::tools::{Tool, ToolInvoker};

/// What an agent decided to do with its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    /// The agent produced its final output.
    Execute { output: String },
    /// The agent wants a coworker to handle a sub-task. The crew runs it and
    /// feeds the answer back through [`Conversation::observe`].
    Delegate {
        coworker: String,
        task: String,
        context: String,
    },
}

/// Message history for one agent working on one task.
#[derive(Debug)]
pub(crate) struct Conversation {
    system_prompt: String,
    messages: Vec<ChatMessage>,
    iterations: u32,
    usage: TokenUsage,
}

impl Conversation {
    pub(crate) fn new(system_prompt: String, task_prompt: String) -> Self {
        Self {
            system_prompt,
            messages: vec![ChatMessage::user(task_prompt)],
            iterations: 0,
            usage: TokenUsage::default(),
        }
    }

    pub(crate) fn observe(&mut self, observation: String) {
        self.messages.push(ChatMessage::user(observation));
    }

    pub(crate) fn add_usage(&mut self, usage: TokenUsage) {
        self.usage += usage;
    }

    pub(crate) fn usage(&self) -> TokenUsage {
        self.usage
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

pub(crate) struct AgentExecutor<'a> {
    llm: &'a dyn LlmClient,
    invoker: ToolInvoker,
    max_iterations: u32,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl<'a> AgentExecutor<'a> {
    pub(crate) fn new(
        llm: &'a dyn LlmClient,
        invoker: ToolInvoker,
        max_iterations: u32,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            llm,
            invoker,
            max_iterations,
            temperature,
            max_tokens,
        }
    }

    /// Drive the conversation until the agent answers or delegates.
    ///
    /// `coworkers` is empty when the agent may not delegate. Tool failures
    /// are recoverable and come back to the model as observations; LLM
    /// failures end the step with an error. Once `max_iterations` turns are
    /// spent the model is asked once more and that reply is the answer; a
    /// blank reply at that point is an error.
    pub(crate) async fn step(
        &self,
        tools: &[Arc<dyn Tool>],
        conversation: &mut Conversation,
        coworkers: &[String],
    ) -> Result<Decision> {
        loop {
            if conversation.iterations >= self.max_iterations {
                debug!(
                    iterations = conversation.iterations,
                    "Iteration budget spent, forcing final answer"
                );
                conversation.observe(prompt::FORCE_FINAL_ANSWER.to_string());
                let reply = self.complete(conversation).await?;
                let output = match AgentAction::parse(&reply) {
                    AgentAction::FinalAnswer { answer } => answer,
                    _ => reply.trim().to_string(),
                };
                if output.trim().is_empty() {
                    return Err(CrewError::LlmRequest(
                        "agent produced an empty final answer".into(),
                    ));
                }
                return Ok(Decision::Execute { output });
            }

            conversation.iterations += 1;
            let reply = self.complete(conversation).await?;

            match AgentAction::parse(&reply) {
                AgentAction::FinalAnswer { answer } if answer.trim().is_empty() => {
                    conversation.observe(prompt::EMPTY_FINAL_ANSWER.to_string());
                }
                AgentAction::FinalAnswer { answer } => {
                    return Ok(Decision::Execute { output: answer });
                }
                AgentAction::UseTool { tool, input } => {
                    let observation = self.use_tool(tools, &tool, &input).await;
                    conversation.observe(observation);
                }
                AgentAction::Delegate {
                    coworker,
                    task,
                    context,
                } => {
                    if coworkers.is_empty() {
                        conversation.observe(prompt::delegation_unavailable_observation());
                        continue;
                    }
                    match coworkers
                        .iter()
                        .find(|role| role.eq_ignore_ascii_case(coworker.trim()))
                    {
                        Some(role) => {
                            return Ok(Decision::Delegate {
                                coworker: role.clone(),
                                task,
                                context,
                            });
                        }
                        None => conversation
                            .observe(prompt::unknown_coworker_observation(&coworker, coworkers)),
                    }
                }
            }
        }
    }

    async fn complete(&self, conversation: &mut Conversation) -> Result<String> {
        let request = LlmRequest {
            system_prompt: Some(conversation.system_prompt.clone()),
            messages: conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self.llm.complete(request).await?;
        debug!(
            model = %response.model,
            reply_len = response.content.len(),
            turn = conversation.iterations,
            "LLM replied"
        );

        if let Some(usage) = response.usage {
            conversation.usage += usage;
        }
        conversation
            .messages
            .push(ChatMessage::assistant(response.content.clone()));
        Ok(response.content)
    }

    async fn use_tool(&self, tools: &[Arc<dyn Tool>], requested: &str, input: &str) -> String {
        let Some(tool) = tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(requested.trim()))
        else {
            return prompt::unknown_tool_observation(requested, tools);
        };

        match self.invoker.invoke(tool.as_ref(), input).await {
            Ok(output) => prompt::tool_observation(tool.name(), &output),
            Err(e) => {
                warn!(tool = %tool.name(), error = %e, "Tool call failed, continuing without it");
                prompt::tool_failure_observation(tool.name(), &e.to_string())
            }
        }
    }
}
