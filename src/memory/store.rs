//! Conversation history storage
//!
//! Holds the messages of one chat session with a running token estimate.

use crate::llm::ChatMessage;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Conversation history for a single connection. Never persisted.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ChatMessage>,
    total_tokens: usize,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: VecDeque::new(),
            total_tokens: 0,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.total_tokens += message.estimated_tokens();
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    /// Replace the history with the outcome of a completed turn.
    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.total_tokens = messages.iter().map(ChatMessage::estimated_tokens).sum();
        self.messages = messages.into();
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Owned copy handed to a turn; the context itself is only updated on success.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn pop_front(&mut self) -> Option<ChatMessage> {
        let message = self.messages.pop_front()?;
        self.total_tokens = self.total_tokens.saturating_sub(message.estimated_tokens());
        Some(message)
    }

    pub fn front(&self) -> Option<&ChatMessage> {
        self.messages.front()
    }

    /// Number of turns, counted by user-typed messages.
    pub fn turn_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user_text()).count()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}
