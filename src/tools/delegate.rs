//! Delegation tools: expose a specialized agent to the root agent as a tool

use super::{required_str, CallerContext, Tool};
use crate::agent::Agent;
use crate::llm::ChatMessage;
use crate::models::ToolOutput;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub struct DelegateTool {
    name: &'static str,
    description: &'static str,
    agent: Arc<Agent>,
}

impl DelegateTool {
    pub fn new(name: &'static str, description: &'static str, agent: Arc<Agent>) -> Self {
        Self {
            name,
            description,
            agent,
        }
    }
}

#[async_trait::async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "What the user wants from this agent, in plain words"
                }
            },
            "required": ["request"]
        })
    }

    /// Runs the agent on a fresh history without streaming; only its final text comes back.
    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let request = required_str(args, "request")?;
        info!(delegate = %self.agent.name(), user_id = %caller.user_id, "Delegating request");

        let mut history = vec![ChatMessage::user(format!("{}\n\n{}", request, caller.facts()))];
        let reply = self.agent.run(caller, &mut history, None, None).await?;

        Ok(ToolOutput::success(reply.content))
    }
}
