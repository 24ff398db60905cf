//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of [`StreamEvent`]s.
//!
//! Implementations: Anthropic Messages API, OpenAI chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};
use crate::stream::StreamEvent;

/// Capacity of the channel between a streaming producer and the loop.
pub const STREAM_BUFFER: usize = 64;

/// A read-once, ordered sequence of events ending in `Done` or `Error`.
pub type EventStream = tokio::sync::mpsc::Receiver<StreamEvent>;

/// Everything a backend needs to produce the next assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514", "gpt-4o").
    /// Empty means the provider's default.
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Maximum tokens to generate (0 = provider default)
    #[serde(default)]
    pub max_tokens: u32,

    /// Temperature (0.0 = provider default)
    #[serde(default)]
    pub temperature: f32,

    /// System instructions, sent the way each backend expects them
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// Generated text
    #[serde(default)]
    pub content: String,

    /// Finished tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Why generation stopped, as the backend reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `complete()`
/// or `complete_stream()` without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: CompletionRequest) -> Result<Response, ProviderError>;

    /// Whether `complete_stream` is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send a request and receive its events as they arrive.
    ///
    /// The returned stream always ends with exactly one `Done` or `Error`.
    /// If `cancel` fires while the stream is open the producer emits
    /// `Error(ProviderError::Cancelled)` and releases the transport.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        let _ = (request, cancel);
        Err(ProviderError::StreamingUnsupported(self.name().to_string()))
    }
}
