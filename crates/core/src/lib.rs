//! # Looper Core
//!
//! Domain types, traits, and error definitions for the Looper agent runtime.
//! This crate has **no I/O of its own**; it defines the model that the
//! sandbox, providers, tools and the agent loop implement against.
//!
//! ## Design Philosophy
//!
//! Every capability the loop needs is a trait here (`Provider`, `Tool`).
//! Implementations live in their respective crates. This enables:
//! - Swapping backends via configuration
//! - Testing the loop with scripted providers and stub tools
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod skill;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role, ToolCall};
pub use provider::{CompletionRequest, EventStream, Provider, Response, ToolDefinition, Usage};
pub use skill::Skill;
pub use stream::{StreamEvent, ToolCallAssembler};
pub use tool::{Tool, ToolRegistry, ToolResult};

/// Re-exported so downstream crates name one cancellation type.
pub use tokio_util::sync::CancellationToken;
