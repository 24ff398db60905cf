//! OpenAI chat-completions provider.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling with index-keyed delta assembly
//! - Usage reporting on streams via `stream_options.include_usage`
//!
//! Works with any endpoint that speaks the same wire format; point
//! `with_base_url` at it.

use std::time::Duration;

use async_trait::async_trait;
use looper_core::message::{Message, Role, ToolCall};
use looper_core::provider::*;
use looper_core::{CancellationToken, ProviderError, StreamEvent, ToolCallAssembler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;
use crate::sse::{EventParser, spawn_event_stream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new provider. An empty key is accepted here and reported
    /// as `MissingApiKey` on the first request.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            client: http::build_client(Duration::from_secs(120)),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model used when a request leaves `model` empty.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.is_empty() {
            self.model = model;
        }
        self
    }

    /// Defaults used when a request leaves `max_tokens`/`temperature` at zero.
    pub fn with_defaults(mut self, max_tokens: u32, temperature: f32) -> Self {
        if max_tokens > 0 {
            self.max_tokens = max_tokens;
        }
        if temperature > 0.0 {
            self.temperature = temperature;
        }
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert our Message types to OpenAI API format. The system prompt
    /// leads as a system message.
    fn to_api_messages(system: &str, messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            out.push(ApiMessage::text("system", system));
        }
        for m in messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            out.push(ApiMessage {
                role: role.into(),
                content: if m.content.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                },
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: if tc.arguments.is_empty() {
                                        "{}".into()
                                    } else {
                                        tc.arguments.clone()
                                    },
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            });
        }
        out
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let max_tokens = if request.max_tokens == 0 {
            self.max_tokens
        } else {
            request.max_tokens
        };
        let temperature = if request.temperature == 0.0 {
            self.temperature
        } else {
            request.temperature
        };

        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::to_api_messages(&request.system, &request.messages),
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn check_key(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("openai".into()));
        }
        Ok(())
    }

    fn parse_response(value: serde_json::Value) -> Result<Response, ProviderError> {
        if let Some(err) = http::embedded_error(&value) {
            return Err(err);
        }
        let api: ApiResponse = serde_json::from_value(value).map_err(|e| ProviderError::Api {
            kind: "invalid_response".into(),
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Api {
                kind: "invalid_response".into(),
                message: "no choices in response".into(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let usage = api
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Response {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            stop_reason: choice.finish_reason,
            usage,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Response, ProviderError> {
        self.check_key()?;
        let body = self.build_body(&request, false);
        debug!(provider = "openai", model = %body["model"], "Sending completion request");

        let response = http::send(
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&body),
            "openai",
        )
        .await?;

        let value: serde_json::Value = response.json().await.map_err(|e| ProviderError::Api {
            kind: "invalid_response".into(),
            message: format!("Failed to parse response: {e}"),
        })?;
        Self::parse_response(value)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        self.check_key()?;
        let body = self.build_body(&request, true);
        debug!(provider = "openai", model = %body["model"], "Sending streaming request");

        let send = http::send(
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .header("Accept", "text/event-stream")
                .json(&body),
            "openai",
        );
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = send => response?,
        };

        Ok(spawn_event_stream(
            response,
            OpenAiStreamParser::default(),
            cancel,
            "openai",
        ))
    }
}

/// Turns chat-completion chunks into stream events.
#[derive(Default)]
struct OpenAiStreamParser {
    calls: ToolCallAssembler,
    usage: Usage,
    stop_reason: Option<String>,
}

impl OpenAiStreamParser {
    fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        for (index, call) in self.calls.finish_all() {
            out.push(StreamEvent::ToolCallEnd { index, call });
        }
        out.push(StreamEvent::Done {
            usage: self.usage,
            stop_reason: self.stop_reason.take(),
        });
    }
}

impl EventParser for OpenAiStreamParser {
    fn on_data(&mut self, data: &str, out: &mut Vec<StreamEvent>) -> bool {
        if data == "[DONE]" {
            self.finish(out);
            return true;
        }

        let value: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::trace!(error = %e, data = %data, "Ignoring unparseable SSE chunk");
                return false;
            }
        };
        if let Some(err) = http::embedded_error(&value) {
            out.push(StreamEvent::Error(err));
            return true;
        }
        let Ok(chunk) = serde_json::from_value::<StreamResponse>(value) else {
            return false;
        };

        if let Some(u) = chunk.usage {
            self.usage = Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            };
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return false;
        };

        if let Some(text) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(StreamEvent::Text(text));
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let index = delta.index;
            let id = delta.id.unwrap_or_default();
            let (name, arguments) = match delta.function {
                Some(f) => (f.name.unwrap_or_default(), f.arguments.unwrap_or_default()),
                None => (String::new(), String::new()),
            };

            if self.calls.start(index, &id, &name) {
                out.push(StreamEvent::ToolCallStart {
                    index,
                    id,
                    name,
                });
            }
            if !arguments.is_empty() {
                self.calls.append(index, &arguments);
                out.push(StreamEvent::ToolCallDelta {
                    index,
                    fragment: arguments,
                });
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.stop_reason = Some(reason);
            for (index, call) in self.calls.finish_all() {
                out.push(StreamEvent::ToolCallEnd { index, call });
            }
        }

        false
    }

    fn on_eof(&mut self, out: &mut Vec<StreamEvent>) {
        self.finish(out);
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
