//! Error types for the Looper domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` ties them together
//! for callers of a whole turn.

use thiserror::Error;

/// The top-level error type for a turn of the agent loop.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("LLM error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    /// The configuration failed validation before a session was built.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    // --- Skills ---
    #[error("Skill error: {0}")]
    Skill(String),

    // --- Loop control ---
    #[error("Max iterations ({limit}) reached")]
    IterationLimitExceeded { limit: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by a provider adapter.
///
/// `MissingApiKey`, `InvalidRequest` and `AuthenticationFailed` are fatal
/// configuration problems; `Network` and `StreamInterrupted` are transport
/// failures the loop does not retry.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API key not configured for {0}")]
    MissingApiKey(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {kind} - {message}")]
    Api { kind: String, message: String },

    #[error("API error: status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider '{0}' does not support streaming")]
    StreamingUnsupported(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Tool-level failures. The loop never aborts on these; they are fed back to
/// the model as `Error: <message>` tool results.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("tool '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("path must be within workspace: {0}")]
    OutsideWorkspace(String),

    #[error("cancelled")]
    Cancelled,
}
