//! Capability-scoped agents
//!
//! An agent is a directive, a scoped tool registry and a model. One run is
//! the loop REASON → (TOOL CALL → TOOL RESULT → REASON)* → FINISHED.

use crate::error::FintrackError;
use crate::llm::{ChatMessage, GenerationRequest, LanguageModel, ModelEvent, Part, Role};
use crate::models::ToolCall;
use crate::tools::{CallerContext, ToolRegistry};
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod directives;

/// Where an agent run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Reasoning,
    ToolCall,
    ToolResult,
    Finished,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub content: String,
    pub tool_calls_made: Vec<String>,
    pub iterations: usize,
}

pub struct AgentBuilder {
    name: String,
    description: String,
    directive: String,
    tools: Option<ToolRegistry>,
    model: Arc<dyn LanguageModel>,
    max_iterations: usize,
}

impl AgentBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Default is 8. Exceeding it fails the run.
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn build(self) -> Agent {
        Agent {
            name: self.name,
            description: self.description,
            directive: self.directive,
            tools: self
                .tools
                .unwrap_or_else(|| ToolRegistry::new(std::time::Duration::from_secs(
                    crate::config::DEFAULT_TOOL_TIMEOUT_SECS,
                ))),
            model: self.model,
            max_iterations: self.max_iterations,
        }
    }
}

pub struct Agent {
    name: String,
    description: String,
    directive: String,
    tools: ToolRegistry,
    model: Arc<dyn LanguageModel>,
    max_iterations: usize,
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: Arc<dyn LanguageModel>) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            description: String::new(),
            directive: String::new(),
            tools: None,
            model,
            max_iterations: crate::config::DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run until the model answers without calling tools.
    ///
    /// `history` must already end with the user's message; model and tool
    /// messages produced by this run are appended to it. Text increments are
    /// forwarded to `sink` as they arrive. `hint` is appended to the
    /// directive for this run only.
    pub async fn run(
        &self,
        caller: &CallerContext,
        history: &mut Vec<ChatMessage>,
        hint: Option<&str>,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<AgentReply> {
        let system = match hint {
            Some(hint) if !hint.is_empty() => format!("{}\n\n{}", self.directive, hint),
            _ => self.directive.clone(),
        };
        let definitions = self.tools.definitions();
        let mut tool_calls_made = Vec::new();
        let mut phase = AgentPhase::Idle;
        debug!(agent = %self.name, phase = ?phase, "Agent run starting");

        for iteration in 1..=self.max_iterations {
            phase = AgentPhase::Reasoning;
            info!(
                agent = %self.name,
                iteration,
                phase = ?phase,
                messages = history.len(),
                tools = definitions.len(),
                user_id = %caller.user_id,
                "Agent reasoning"
            );

            let request = GenerationRequest {
                system: system.clone(),
                messages: history.clone(),
                tools: definitions.clone(),
            };

            let mut stream = self.model.stream(request).await?;
            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    ModelEvent::TextDelta(delta) => {
                        if let Some(sink) = sink {
                            if sink.send(delta.clone()).await.is_err() {
                                debug!(agent = %self.name, "Delta receiver closed");
                            }
                        }
                        text.push_str(&delta);
                    }
                    ModelEvent::ToolCall(call) => calls.push(call),
                }
            }

            if calls.is_empty() {
                history.push(ChatMessage::model(text.clone()));
                phase = AgentPhase::Finished;
                debug!(agent = %self.name, phase = ?phase, iterations = iteration, "Agent finished");
                return Ok(AgentReply {
                    content: text,
                    tool_calls_made,
                    iterations: iteration,
                });
            }

            let mut parts = Vec::with_capacity(calls.len() + 1);
            if !text.is_empty() {
                parts.push(Part::Text(text));
            }
            parts.extend(calls.iter().cloned().map(Part::ToolCall));
            history.push(ChatMessage {
                role: Role::Model,
                parts,
            });

            phase = AgentPhase::ToolCall;
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                debug!(agent = %self.name, phase = ?phase, tool = %call.name, "Executing tool call");
                let output = self.tools.invoke(caller, call).await?;
                tool_calls_made.push(call.name.clone());
                results.push((call.name.clone(), output.content));
            }

            phase = AgentPhase::ToolResult;
            debug!(agent = %self.name, phase = ?phase, results = results.len(), "Tool results appended");
            history.push(ChatMessage::tool_results(results));
        }

        warn!(
            agent = %self.name,
            max_iterations = self.max_iterations,
            phase = ?phase,
            "Agent reached max iterations"
        );
        Err(FintrackError::MaxIterationsExceeded(format!(
            "{} stopped after {} iterations",
            self.name, self.max_iterations
        )))
    }
}
