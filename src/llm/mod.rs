//! Language model abstraction
//!
//! A model turns a conversation plus tool declarations into a stream of
//! text increments and tool calls.

use crate::models::ToolCall;
use crate::tools::ToolDefinition;
use crate::Result;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub mod gemini;
pub mod scripted;
pub mod sse;

pub use gemini::GeminiClient;
pub use scripted::{ScriptStep, ScriptedModel};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult { name: String, content: String },
}

impl Part {
    fn char_len(&self) -> usize {
        match self {
            Part::Text(text) => text.chars().count(),
            Part::ToolCall(call) => call.name.len() + call.args.to_string().len(),
            Part::ToolResult { name, content } => name.len() + content.chars().count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Model,
            parts: calls.into_iter().map(Part::ToolCall).collect(),
        }
    }

    pub fn tool_results(results: Vec<(String, String)>) -> Self {
        Self {
            role: Role::User,
            parts: results
                .into_iter()
                .map(|(name, content)| Part::ToolResult { name, content })
                .collect(),
        }
    }

    /// A user turn typed by a person, as opposed to tool results sent back on the user's side.
    pub fn is_user_text(&self) -> bool {
        self.role == Role::User && self.parts.iter().all(|p| matches!(p, Part::Text(_)))
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Rough token estimate: four characters per token.
    pub fn estimated_tokens(&self) -> usize {
        let chars: usize = self.parts.iter().map(Part::char_len).sum();
        (chars + 3) / 4 + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolCall),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>;

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Start one generation step. Errors before the first event are returned
    /// directly; later failures arrive as `Err` items on the stream.
    async fn stream(&self, request: GenerationRequest) -> Result<ModelStream>;
}
