//! Prompt construction and the JSON reply protocol.
//!
//! Agents answer with one JSON object per turn:
//!
//! ```text
//! {"action": "use_tool", "tool": "search", "input": "latest quantum chips"}
//! {"action": "delegate", "coworker": "Writer", "task": "...", "context": "..."}
//! {"action": "final_answer", "answer": "..."}
//! ```
//!
//! Anything that is not a recognised action is taken as the final answer.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;

use crate::agent::Agent;
use crate::tools::Tool;

pub(crate) const FORCE_FINAL_ANSWER: &str = "You have used all available steps. \
Reply now with your best final answer as plain text, without calling tools or delegating.";

pub(crate) const EMPTY_FINAL_ANSWER: &str =
    "Your final answer was empty. Reply with the complete final answer.";

pub(crate) const DELEGATED_EXPECTED_OUTPUT: &str =
    "Your best answer to your coworker asking you this, accounting for the context shared.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum AgentAction {
    FinalAnswer {
        answer: String,
    },
    UseTool {
        tool: String,
        #[serde(default)]
        input: String,
    },
    Delegate {
        coworker: String,
        task: String,
        #[serde(default)]
        context: String,
    },
}

impl AgentAction {
    /// Interpret a model reply. Never fails: unrecognised replies become the
    /// final answer verbatim (trimmed).
    pub(crate) fn parse(reply: &str) -> Self {
        extract_json_object(reply)
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_else(|| AgentAction::FinalAnswer {
                answer: reply.trim().to_string(),
            })
    }
}

/// First balanced `{...}` in `s`, ignoring braces inside JSON strings.
pub(crate) fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

pub(crate) fn system_prompt(agent: &Agent, tools: &[Arc<dyn Tool>], coworkers: &[String]) -> String {
    let mut prompt = format!("You are {}.", agent.role());
    if !agent.backstory().trim().is_empty() {
        let _ = write!(prompt, " {}", agent.backstory().trim());
    }
    let _ = write!(prompt, "\nYour personal goal is: {}", agent.goal());

    if tools.is_empty() && coworkers.is_empty() {
        prompt.push_str("\n\nReply with your final answer directly.");
        return prompt;
    }

    prompt.push_str(
        "\n\nYou work step by step. On each turn reply with exactly one JSON object and nothing else.",
    );

    if !tools.is_empty() {
        prompt.push_str("\n\nTools you can use:");
        for tool in tools {
            let _ = write!(prompt, "\n- {}: {}", tool.name(), tool.description());
        }
        prompt.push_str(
            "\nTo use a tool reply with:\n\
             {\"action\": \"use_tool\", \"tool\": \"<tool name>\", \"input\": \"<query>\"}",
        );
    }

    if !coworkers.is_empty() {
        let _ = write!(
            prompt,
            "\n\nCoworkers you can delegate work to: {}",
            coworkers.join(", ")
        );
        prompt.push_str(
            "\nTo delegate reply with:\n\
             {\"action\": \"delegate\", \"coworker\": \"<coworker role>\", \
             \"task\": \"<what they should do>\", \"context\": \"<everything they need to know>\"}\n\
             Your coworker knows nothing about your task beyond what you send.",
        );
    }

    prompt.push_str(
        "\n\nWhen you are done reply with:\n\
         {\"action\": \"final_answer\", \"answer\": \"<your complete final answer>\"}",
    );
    prompt
}

pub(crate) fn task_prompt(description: &str, expected_output: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Current task: {description}\n\n\
         Criteria for your final answer: {expected_output}\n\
         Your final answer must be the complete content, not a summary of it."
    );
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let _ = write!(prompt, "\n\nContext for this task:\n{context}");
    }
    prompt
}

/// Joins several task outputs into one context block.
pub(crate) fn join_context<'a>(outputs: impl IntoIterator<Item = &'a str>) -> String {
    outputs.into_iter().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

pub(crate) fn tool_observation(tool: &str, output: &str) -> String {
    format!("Observation from {tool}:\n{output}")
}

pub(crate) fn tool_failure_observation(tool: &str, error: &str) -> String {
    format!(
        "The {tool} tool failed: {error}\n\
         Try a different input, another tool, or continue without it."
    )
}

pub(crate) fn unknown_tool_observation(requested: &str, tools: &[Arc<dyn Tool>]) -> String {
    if tools.is_empty() {
        return format!("There is no tool named '{requested}'. You have no tools; give your final answer.");
    }
    let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
    format!(
        "There is no tool named '{requested}'. Available tools: {}",
        names.join(", ")
    )
}

pub(crate) fn delegation_unavailable_observation() -> String {
    "Delegation is not available to you. Complete the task yourself.".to_string()
}

pub(crate) fn unknown_coworker_observation(requested: &str, coworkers: &[String]) -> String {
    format!(
        "There is no coworker named '{requested}'. Coworkers: {}",
        coworkers.join(", ")
    )
}

pub(crate) fn delegation_observation(coworker: &str, answer: &str) -> String {
    format!("{coworker} replied:\n{answer}")
}
