//! LLM provider adapters for looper.
//!
//! All adapters implement the `looper_core::Provider` trait and stream over
//! server-sent events. [`build_provider`] picks one from configuration.

pub mod anthropic;
mod http;
pub mod openai;
pub mod router;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use router::{build_named, build_provider};
