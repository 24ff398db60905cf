//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events

use std::time::Duration;

use async_trait::async_trait;
use looper_core::message::{Message, Role, ToolCall};
use looper_core::provider::*;
use looper_core::{CancellationToken, ProviderError, StreamEvent, ToolCallAssembler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;
use crate::sse::{EventParser, spawn_event_stream};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            // Long tool-heavy turns can take a while.
            client: http::build_client(Duration::from_secs(300)),
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
        format!("{}/v1/messages", self.base_url)
    }

    /// Collect the system prompt: the request field first, then any system
    /// messages in the conversation. Anthropic takes it as a top-level field.
    fn extract_system<'a>(system: &str, messages: &'a [Message]) -> (Option<String>, Vec<&'a Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        if !system.is_empty() {
            system_parts.push(system);
        }
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results are merged into one user turn so every
    /// `tool_use` of an assistant turn is answered together.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            let input = tc
                                .parsed_arguments()
                                .unwrap_or_else(|_| serde_json::json!({}));
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input,
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.system, &request.messages);
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
            "messages": Self::to_api_messages(&messages),
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn post(&self, body: &serde_json::Value) -> Result<reqwest::RequestBuilder, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("anthropic".into()));
        }
        Ok(self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body))
    }

    /// Convert an Anthropic API response to ours. Text blocks are
    /// concatenated in order.
    fn convert_response(resp: AnthropicResponse) -> Response {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => content.push_str(&text),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    let arguments = serde_json::to_string(&input).unwrap_or_default();
                    tool_calls.push(ToolCall::new(id, name, arguments));
                }
                ResponseContentBlock::Other => {}
            }
        }

        Response {
            content,
            tool_calls,
            stop_reason: resp.stop_reason,
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Response, ProviderError> {
        let body = self.build_body(&request, false);
        let builder = self.post(&body)?;
        debug!(provider = "anthropic", model = %body["model"], "Sending completion request");

        let response = http::send(builder, "anthropic").await?;
        let value: serde_json::Value = response.json().await.map_err(|e| ProviderError::Api {
            kind: "invalid_response".into(),
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;
        if let Some(err) = http::embedded_error(&value) {
            return Err(err);
        }
        let api_resp: AnthropicResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Api {
                kind: "invalid_response".into(),
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(Self::convert_response(api_resp))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        let body = self.build_body(&request, true);
        let builder = self.post(&body)?.header("Accept", "text/event-stream");
        debug!(provider = "anthropic", model = %body["model"], "Sending streaming request");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = http::send(builder, "anthropic") => response?,
        };

        Ok(spawn_event_stream(
            response,
            AnthropicStreamParser::default(),
            cancel,
            "anthropic",
        ))
    }
}

/// Turns Messages API stream events into [`StreamEvent`]s.
///
/// Anthropic sends an `event:` line before each payload, but the payload's
/// own `type` field carries the same information, so only `data:` is read.
#[derive(Default)]
struct AnthropicStreamParser {
    calls: ToolCallAssembler,
    usage: Usage,
    stop_reason: Option<String>,
}

impl AnthropicStreamParser {
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

impl EventParser for AnthropicStreamParser {
    fn on_data(&mut self, data: &str, out: &mut Vec<StreamEvent>) -> bool {
        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return false;
            }
        };

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(n) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage.input_tokens = n;
                }
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    let index = event["index"].as_u64().unwrap_or(0) as usize;
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    if self.calls.start(index, &id, &name) {
                        out.push(StreamEvent::ToolCallStart { index, id, name });
                    }
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(StreamEvent::Text(text.to_string()));
                        }
                    }
                    "input_json_delta" => {
                        let index = event["index"].as_u64().unwrap_or(0) as usize;
                        if let Some(partial) =
                            delta["partial_json"].as_str().filter(|p| !p.is_empty())
                        {
                            self.calls.append(index, partial);
                            out.push(StreamEvent::ToolCallDelta {
                                index,
                                fragment: partial.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = event["index"].as_u64().unwrap_or(0) as usize;
                if let Some(call) = self.calls.finish(index) {
                    out.push(StreamEvent::ToolCallEnd { index, call });
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(n) = event["usage"]["output_tokens"].as_u64() {
                    self.usage.output_tokens = n;
                }
            }
            "message_stop" => {
                self.finish(out);
                return true;
            }
            "error" => {
                if let Some(err) = http::embedded_error(&event) {
                    out.push(StreamEvent::Error(err));
                    return true;
                }
            }
            _ => {}
        }

        false
    }

    fn on_eof(&mut self, out: &mut Vec<StreamEvent>) {
        self.finish(out);
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
