//! Streaming event model.
//!
//! A streamed completion is a sequence of [`StreamEvent`]s ending in exactly
//! one terminal event (`Done` or `Error`). Tool calls are keyed by the
//! backend's integer index; the id is metadata and may show up late.

use std::collections::BTreeMap;

use crate::error::ProviderError;
use crate::message::ToolCall;
use crate::provider::Usage;

/// One discrete event from a streaming provider.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    Text(String),

    /// A tool call begins at `index`.
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A fragment of the argument JSON for the call at `index`.
    ToolCallDelta { index: usize, fragment: String },

    /// The call at `index` is complete; `call.arguments` holds the full text.
    ToolCallEnd { index: usize, call: ToolCall },

    /// The response finished.
    Done {
        usage: Usage,
        stop_reason: Option<String>,
    },

    /// The response failed.
    Error(ProviderError),
}

impl StreamEvent {
    /// `Done` and `Error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error(_))
    }
}

#[derive(Debug, Default, Clone)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
    ended: bool,
}

/// Index-keyed accumulator for streamed tool calls.
///
/// Producers feed it backend deltas and get back the events to emit;
/// consumers feed it events and read finished calls in index order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a call, or fill in id/name learned later.
    ///
    /// Returns `true` the first time `index` is seen.
    pub fn start(&mut self, index: usize, id: &str, name: &str) -> bool {
        let is_new = !self.calls.contains_key(&index);
        let entry = self.calls.entry(index).or_default();
        if !id.is_empty() {
            entry.id = id.to_string();
        }
        if !name.is_empty() && entry.name.is_empty() {
            entry.name = name.to_string();
        }
        is_new
    }

    /// Append an argument fragment to the call at `index`.
    pub fn append(&mut self, index: usize, fragment: &str) {
        self.calls
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Whether the call at `index` has been started and not yet finished.
    pub fn is_open(&self, index: usize) -> bool {
        self.calls.get(&index).is_some_and(|c| !c.ended)
    }

    /// Mark the call at `index` complete and return it.
    ///
    /// `None` if the index was never started or was already finished.
    pub fn finish(&mut self, index: usize) -> Option<ToolCall> {
        let call = self.calls.get_mut(&index)?;
        if call.ended {
            return None;
        }
        call.ended = true;
        Some(ToolCall::new(
            call.id.clone(),
            call.name.clone(),
            call.arguments.clone(),
        ))
    }

    /// Finish every still-open call, in index order.
    pub fn finish_all(&mut self) -> Vec<(usize, ToolCall)> {
        let open: Vec<usize> = self
            .calls
            .iter()
            .filter(|(_, c)| !c.ended)
            .map(|(i, _)| *i)
            .collect();
        open.into_iter()
            .filter_map(|i| self.finish(i).map(|call| (i, call)))
            .collect()
    }

    /// Replace the accumulated state of `index` with a finished call.
    ///
    /// Consumers use this when a `ToolCallEnd` carries the authoritative
    /// payload. An empty `arguments` keeps whatever fragments were seen.
    pub fn complete_with(&mut self, index: usize, call: &ToolCall) {
        let entry = self.calls.entry(index).or_default();
        if !call.id.is_empty() {
            entry.id = call.id.clone();
        }
        if !call.name.is_empty() {
            entry.name = call.name.clone();
        }
        if !call.arguments.is_empty() {
            entry.arguments = call.arguments.clone();
        }
        entry.ended = true;
    }

    /// All calls seen so far, in index order.
    pub fn into_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .map(|c| ToolCall::new(c.id, c.name, c.arguments))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
