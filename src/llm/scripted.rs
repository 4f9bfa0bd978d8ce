//! Scripted language model for tests and offline runs
//!
//! Each call to `stream` consumes the next scripted step list and records
//! the request it was given.

use super::{GenerationRequest, LanguageModel, ModelEvent, ModelStream};
use crate::error::FintrackError;
use crate::models::ToolCall;
use crate::Result;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptStep {
    Text(String),
    Call { name: String, args: Value },
    /// Fail mid-stream after the preceding steps were delivered.
    Fail(String),
    Pause(Duration),
}

impl ScriptStep {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn call(name: impl Into<String>, args: Value) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Steps(Vec<ScriptStep>),
    Refuse(String),
}

#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events for the next generation step.
    pub fn then(self, steps: Vec<ScriptStep>) -> Self {
        self.push(Scripted::Steps(steps));
        self
    }

    /// Queue a step that fails before producing anything.
    pub fn then_refuse(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Refuse(message.into()));
        self
    }

    pub fn enqueue(&self, steps: Vec<ScriptStep>) {
        self.push(Scripted::Steps(steps));
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|script| script.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ModelStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self
            .script
            .lock()
            .map_err(|_| FintrackError::LlmError("script lock poisoned".to_string()))?
            .pop_front();

        let steps = match next {
            Some(Scripted::Steps(steps)) => steps,
            Some(Scripted::Refuse(message)) => return Err(FintrackError::LlmError(message)),
            None => {
                return Err(FintrackError::LlmError(
                    "scripted model has no response left".to_string(),
                ))
            }
        };

        let events = stream::iter(steps).filter_map(|step| async move {
            match step {
                ScriptStep::Text(text) => Some(Ok(ModelEvent::TextDelta(text))),
                ScriptStep::Call { name, args } => Some(Ok(ModelEvent::ToolCall(ToolCall {
                    id: None,
                    name,
                    args,
                }))),
                ScriptStep::Fail(message) => Some(Err(FintrackError::LlmError(message))),
                ScriptStep::Pause(duration) => {
                    tokio::time::sleep(duration).await;
                    None
                }
            }
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_and_records_requests() {
        let model = ScriptedModel::new()
            .then(vec![ScriptStep::call("get_current_balance", json!({}))])
            .then(vec![ScriptStep::text("Your balance is "), ScriptStep::text("90.")]);

        let first: Vec<_> = model
            .stream(GenerationRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(first[0], Ok(ModelEvent::ToolCall(_))));

        let second: Vec<_> = model
            .stream(GenerationRequest::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(second.len(), 2);

        assert_eq!(model.requests().len(), 2);
        assert_eq!(model.remaining(), 0);
        assert!(model.stream(GenerationRequest::default()).await.is_err());
    }
}
