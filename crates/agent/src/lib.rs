//! The agent loop, the heart of looper.
//!
//! One turn runs a **request → tools → request** cycle:
//!
//! 1. **Append** the user message to the conversation
//! 2. **Build the request** (system prompt + activated skills + history + tool definitions)
//! 3. **Send to the LLM** via the configured provider, streaming when supported
//! 4. **If tool calls**: execute them in order, append results, loop back to step 2
//! 5. **If text only**: record it and return it as the turn's answer
//!
//! The loop ends on a text-only response, cancellation, a provider error,
//! or when the session iteration ceiling is reached.

pub mod context;
pub mod loop_runner;
pub mod observer;

pub use context::ConversationContext;
pub use loop_runner::{Agent, DEFAULT_MAX_ITERATIONS};
pub use observer::{NoopObserver, StreamObserver};
