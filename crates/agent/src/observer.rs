//! Hooks for watching a streamed turn.

use looper_core::message::ToolCall;
use looper_core::provider::Usage;

/// Receives progress from [`Agent::run_stream`](crate::Agent::run_stream).
///
/// Every hook defaults to a no-op. Hooks observe; they cannot change what the
/// loop does next.
pub trait StreamObserver: Send {
    /// A text fragment from the model.
    fn on_text(&mut self, _text: &str) {}

    /// A tool is about to run.
    fn on_tool_call_start(&mut self, _call: &ToolCall) {}

    /// A tool finished. `output` is what the model will see, including the
    /// `Error: ` prefix when the call failed.
    fn on_tool_call_end(&mut self, _call: &ToolCall, _output: &str, _success: bool) {}

    /// Token usage of one completed request.
    fn on_usage(&mut self, _usage: Usage) {}

    /// The turn produced its final answer.
    fn on_done(&mut self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}
