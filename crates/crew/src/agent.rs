//! Agent definition: a role with a goal, a backstory and permitted tools.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crewline_common::{CrewError, Result};

use crate::template::interpolate;
use crate::tools::Tool;

/// Identifier tasks use to refer to their agent without owning it.
pub type AgentId = String;

/// A configured persona consumed by the [`Crew`](crate::Crew).
///
/// Role, goal and backstory are opaque prompt text; the engine never
/// branches on their content. Agents are immutable once built.
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    role: String,
    goal: String,
    backstory: String,
    tools: Vec<Arc<dyn Tool>>,
    allow_delegation: bool,
}

impl Agent {
    /// Fails with `InvalidAgentConfig` when role or goal is blank.
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Result<Self> {
        let role = role.into();
        let goal = goal.into();

        if role.trim().is_empty() {
            return Err(CrewError::InvalidAgentConfig(
                "agent role must not be empty".into(),
            ));
        }
        if goal.trim().is_empty() {
            return Err(CrewError::InvalidAgentConfig(format!(
                "agent '{role}' must have a goal"
            )));
        }

        Ok(Self {
            id: format!("agent_{}", uuid::Uuid::new_v4()),
            role,
            goal,
            backstory: backstory.into(),
            tools: Vec::new(),
            allow_delegation: false,
        })
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn backstory(&self) -> &str {
        &self.backstory
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn allow_delegation(&self) -> bool {
        self.allow_delegation
    }

    /// Copy with `{key}` placeholders filled in. The id is preserved so task
    /// assignments stay valid.
    pub(crate) fn interpolate(&self, inputs: &HashMap<String, String>) -> Self {
        Self {
            id: self.id.clone(),
            role: interpolate(&self.role, inputs),
            goal: interpolate(&self.goal, inputs),
            backstory: interpolate(&self.backstory, inputs),
            tools: self.tools.clone(),
            allow_delegation: self.allow_delegation,
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("goal", &self.goal)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("allow_delegation", &self.allow_delegation)
            .finish()
    }
}
