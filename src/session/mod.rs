//! Chat sessions
//!
//! One `ChatSession` per authenticated connection. It owns the conversation
//! context and the turn counter; turns run one at a time. Model text is
//! streamed through a bounded channel, cut into fixed-size chunks and
//! published to the user's delivery channel.

use crate::agent::AgentReply;
use crate::config::SessionSettings;
use crate::error::FintrackError;
use crate::memory::{ContextConfig, ContextManager, ConversationContext};
use crate::orchestrator::Orchestrator;
use crate::tools::CallerContext;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub mod chunker;
pub mod envelope;
pub mod hub;

pub use chunker::ChunkBuffer;
pub use envelope::wrap_message;
pub use hub::DeliveryHub;

/// Capacity of the per-turn delta channel between generation and delivery.
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// JSON frame sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
}

impl OutboundFrame {
    pub fn chunk(message: impl Into<String>, message_id: u64) -> Self {
        Self {
            message: message.into(),
            message_id: Some(message_id),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            message_id: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What the client is told when a turn fails.
fn failure_message(err: &FintrackError) -> String {
    match err {
        FintrackError::Timeout(_) => {
            "The request took too long to answer. Please try again.".to_string()
        }
        FintrackError::MaxIterationsExceeded(_) => {
            "I could not finish that request. Please try rephrasing it.".to_string()
        }
        FintrackError::LlmError(msg) => format!("The assistant is unavailable: {}", msg),
        other => format!("Something went wrong: {}", other),
    }
}

pub struct ChatSession {
    caller: CallerContext,
    message_id: u64,
    context: ConversationContext,
    context_manager: ContextManager,
    orchestrator: Arc<Orchestrator>,
    hub: DeliveryHub,
    settings: SessionSettings,
}

impl ChatSession {
    /// Bind an authenticated caller and join its delivery channel. An
    /// unauthenticated connection is refused before any membership exists.
    pub async fn open(
        caller: Option<CallerContext>,
        orchestrator: Arc<Orchestrator>,
        hub: DeliveryHub,
        settings: SessionSettings,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<Self> {
        let caller = caller.ok_or_else(|| {
            FintrackError::Unauthorized("connection is not authenticated".to_string())
        })?;

        hub.join(caller.user_id, caller.connection_id, outbound).await;
        info!(
            user_id = %caller.user_id,
            connection_id = %caller.connection_id,
            "Chat session opened"
        );

        let context_manager = ContextManager::with_config(ContextConfig {
            max_context_tokens: settings.context_max_tokens,
            ..ContextConfig::default()
        });

        Ok(Self {
            caller,
            message_id: 0,
            context: ConversationContext::new(),
            context_manager,
            orchestrator,
            hub,
            settings,
        })
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    /// Id of the most recent turn; 0 before the first message.
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Run one turn. Chunks and, on failure, a single error frame are
    /// published before this returns. A failed turn leaves the context as it
    /// was before the message.
    pub async fn handle_message(&mut self, text: &str) -> Result<AgentReply> {
        self.message_id += 1;
        let message_id = self.message_id;
        let user_id = self.caller.user_id;
        info!(
            %user_id,
            connection_id = %self.caller.connection_id,
            message_id,
            "Turn started"
        );

        let envelope = wrap_message(&self.caller, text);
        let mut working = self.context.snapshot();
        let (tx, mut rx) = mpsc::channel::<String>(DELTA_CHANNEL_CAPACITY);

        let caller = self.caller.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let turn_timeout = self.settings.turn_timeout;
        let history = &mut working;
        let generation = async move {
            let result = tokio::time::timeout(
                turn_timeout,
                orchestrator.respond(&caller, history, text, envelope, Some(&tx)),
            )
            .await;
            drop(tx);
            match result {
                Ok(reply) => reply,
                Err(_) => Err(FintrackError::Timeout(format!(
                    "turn exceeded {}s",
                    turn_timeout.as_secs()
                ))),
            }
        };

        // Publishing never waits on a connection, so delivery ends as soon
        // as generation drops its sender.
        let hub = self.hub.clone();
        let threshold = self.settings.flush_threshold;
        let delivery = async move {
            let mut buffer = ChunkBuffer::new(threshold);
            let mut chunks = 0usize;
            while let Some(delta) = rx.recv().await {
                for chunk in buffer.push(&delta) {
                    hub.publish(user_id, OutboundFrame::chunk(chunk, message_id)).await;
                    chunks += 1;
                }
            }
            if let Some(rest) = buffer.finish() {
                hub.publish(user_id, OutboundFrame::chunk(rest, message_id)).await;
                chunks += 1;
            }
            chunks
        };

        let (result, chunks) = tokio::join!(generation, delivery);

        match result {
            Ok(reply) => {
                self.context.replace(working);
                self.context_manager.trim(&mut self.context);
                info!(
                    %user_id,
                    message_id,
                    chunks,
                    iterations = reply.iterations,
                    tools = ?reply.tool_calls_made,
                    context_tokens = self.context.total_tokens(),
                    "Turn completed"
                );
                Ok(reply)
            }
            Err(err) => {
                error!(%user_id, message_id, chunks, error = %err, "Turn failed");
                let frame = OutboundFrame::chunk(failure_message(&err), message_id);
                if self.hub.publish(user_id, frame).await == 0 {
                    warn!(%user_id, message_id, "No connection received the error frame");
                }
                Err(err)
            }
        }
    }

    /// Leave the delivery channel.
    pub async fn close(self) {
        self.hub
            .leave(self.caller.user_id, self.caller.connection_id)
            .await;
        info!(
            user_id = %self.caller.user_id,
            connection_id = %self.caller.connection_id,
            turns = self.message_id,
            "Chat session closed"
        );
    }
}
