//! Server-sent events plumbing shared by the streaming adapters.
//!
//! [`SseDecoder`] turns raw body chunks into `data:` payloads; an
//! [`EventParser`] turns payloads into [`StreamEvent`]s; [`spawn_event_stream`]
//! drives both on a background task and hands the events over a bounded
//! channel.

use futures::StreamExt;
use looper_core::provider::{EventStream, STREAM_BUFFER};
use looper_core::{CancellationToken, ProviderError, StreamEvent};
use tracing::{debug, trace};

/// Incremental SSE line splitter.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the `data:` payloads of every completed line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}

/// Converts one backend's SSE payloads into stream events.
pub trait EventParser: Send + 'static {
    /// Handle one `data:` payload, pushing events to `out`.
    ///
    /// Returns `true` once a terminal event has been pushed.
    fn on_data(&mut self, data: &str, out: &mut Vec<StreamEvent>) -> bool;

    /// The body ended without a terminal payload. Must push exactly one
    /// terminal event.
    fn on_eof(&mut self, out: &mut Vec<StreamEvent>);
}

/// Drive `parser` over the body of `response` on a background task.
///
/// The returned stream ends with exactly one terminal event. When `cancel`
/// fires, `Error(Cancelled)` is sent and the response is dropped.
pub fn spawn_event_stream<P: EventParser>(
    response: reqwest::Response,
    mut parser: P,
    cancel: CancellationToken,
    provider: &'static str,
) -> EventStream {
    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut pending: Vec<StreamEvent> = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(provider, "Stream cancelled");
                    let _ = tx.send(StreamEvent::Error(ProviderError::Cancelled)).await;
                    return;
                }
                chunk = body.next() => chunk,
            };

            let finished = match chunk {
                Some(Ok(bytes)) => {
                    let mut done = false;
                    for data in decoder.feed(&bytes) {
                        trace!(provider, data = %data, "SSE payload");
                        if parser.on_data(&data, &mut pending) {
                            done = true;
                            break;
                        }
                    }
                    done
                }
                Some(Err(e)) => {
                    pending.push(StreamEvent::Error(ProviderError::StreamInterrupted(
                        e.to_string(),
                    )));
                    true
                }
                None => {
                    let done = decoder
                        .finish()
                        .is_some_and(|data| parser.on_data(&data, &mut pending));
                    if !done {
                        parser.on_eof(&mut pending);
                    }
                    true
                }
            };

            for event in pending.drain(..) {
                if tx.send(event).await.is_err() {
                    // Receiver dropped; nobody is listening.
                    return;
                }
            }
            if finished {
                return;
            }
        }
    });

    rx
}
