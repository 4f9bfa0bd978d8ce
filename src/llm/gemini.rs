//! Gemini API client
//!
//! Streams `streamGenerateContent` over SSE with function declarations.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::sse::SseStream;
use super::{ChatMessage, GenerationRequest, LanguageModel, ModelEvent, ModelStream, Part, Role};
use crate::error::FintrackError;
use crate::models::ToolCall;
use crate::tools::ToolDefinition;
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(FintrackError::Config("GEMINI_API_KEY not configured".to_string()));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ModelStream> {
        let body = build_request(&request);

        info!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                FintrackError::LlmError(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(FintrackError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let events = SseStream::new(response.bytes_stream())
            .map(|data| data.and_then(|payload| parse_chunk(&payload)))
            .flat_map(|parsed| {
                let items: Vec<Result<ModelEvent>> = match parsed {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            });

        Ok(Box::pin(events))
    }
}

//
// ================= Wire format =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn text_part(text: &str) -> WirePart {
    WirePart {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

fn to_wire(message: &ChatMessage) -> Content {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "model",
    };

    let parts = message
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => text_part(text),
            Part::ToolCall(call) => WirePart {
                function_call: Some(FunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                }),
                ..Default::default()
            },
            Part::ToolResult { name, content } => WirePart {
                function_response: Some(FunctionResponse {
                    name: name.clone(),
                    response: json!({ "content": content }),
                }),
                ..Default::default()
            },
        })
        .collect();

    Content {
        role: Some(role.to_string()),
        parts,
    }
}

/// Declarations without arguments omit `parameters`; the API rejects empty object schemas.
fn to_declaration(tool: &ToolDefinition) -> FunctionDeclaration {
    let has_properties = tool.parameters["properties"]
        .as_object()
        .map_or(false, |props| !props.is_empty());

    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: has_properties.then(|| tool.parameters.clone()),
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolDeclarations {
            function_declarations: request.tools.iter().map(to_declaration).collect(),
        }]
    };

    GeminiRequest {
        contents: request.messages.iter().map(to_wire).collect(),
        system_instruction: (!request.system.is_empty()).then(|| SystemInstruction {
            parts: vec![text_part(&request.system)],
        }),
        tools,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            max_output_tokens: 2048,
        },
    }
}

/// Events carried by one SSE payload, in order.
fn parse_chunk(payload: &str) -> Result<Vec<ModelEvent>> {
    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        FintrackError::LlmError(format!(
            "Failed to parse Gemini stream chunk: {} (data: {})",
            e,
            payload.chars().take(200).collect::<String>()
        ))
    })?;

    if let Some(err) = chunk.error {
        return Err(FintrackError::LlmError(format!("Gemini stream error: {}", err)));
    }

    let mut events = Vec::new();
    for candidate in chunk.candidates.into_iter().take(1) {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            debug!(finish_reason = %reason, "Gemini candidate finished");
            if matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
                return Err(FintrackError::LlmError(format!(
                    "Gemini stopped generation: {}",
                    reason
                )));
            }
        }

        for part in candidate.content.parts {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                events.push(ModelEvent::TextDelta(text));
            }
            if let Some(call) = part.function_call {
                events.push(ModelEvent::ToolCall(ToolCall {
                    id: Some(Uuid::new_v4().to_string()),
                    name: call.name,
                    args: if call.args.is_null() { json!({}) } else { call.args },
                }));
            }
        }
    }

    Ok(events)
}
