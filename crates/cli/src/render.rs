//! Terminal rendering for a streamed turn.

use std::io::Write;

use looper_agent::StreamObserver;
use looper_core::message::ToolCall;
use looper_core::provider::Usage;

/// Tool output longer than this is cut in the terminal (the model still
/// sees all of it).
const MAX_RESULT_DISPLAY: usize = 500;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
pub const RESET: &str = "\x1b[0m";

pub fn assistant_label() -> String {
    format!("{BOLD}{BLUE}Assistant:{RESET} ")
}

pub fn user_label() -> String {
    format!("{BOLD}{GREEN}You:{RESET} ")
}

pub fn error_line(message: &str) -> String {
    format!("{RED}Error: {message}{RESET}")
}

pub fn dim(text: &str) -> String {
    format!("{DIM}{text}{RESET}")
}

/// Cut `text` to at most `max` bytes on a char boundary.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &text[..end])
}

/// Arguments as indented JSON, or the raw text if they don't parse.
fn pretty_arguments(call: &ToolCall) -> String {
    call.parsed_arguments()
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| call.arguments.clone())
        .replace('\n', "\n  ")
}

/// Prints text as it streams, plus a block per tool call.
#[derive(Default)]
pub struct TerminalObserver {
    usage: Usage,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens used by this turn.
    pub fn usage(&self) -> Usage {
        self.usage
    }
}

impl StreamObserver for TerminalObserver {
    fn on_text(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_tool_call_start(&mut self, call: &ToolCall) {
        println!("\n\n{BOLD}{MAGENTA}▶ Tool Call: {}{RESET}", call.name);
        println!("  {}", dim(&pretty_arguments(call)));
    }

    fn on_tool_call_end(&mut self, _call: &ToolCall, output: &str, success: bool) {
        let shown = truncate(output, MAX_RESULT_DISPLAY).replace('\n', "\n  ");
        if success {
            println!("{BOLD}{GREEN}✓ Result:{RESET}\n  {}", dim(&shown));
        } else {
            println!("{BOLD}{RED}✗ Failed:{RESET}\n  {}", dim(&shown));
        }
        print!("\n{}", assistant_label());
        let _ = std::io::stdout().flush();
    }

    fn on_usage(&mut self, usage: Usage) {
        self.usage += usage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn long_text_cut_on_char_boundary() {
        let text = "é".repeat(10); // 2 bytes each
        let out = truncate(&text, 5);
        assert_eq!(out, format!("{}... (truncated)", "é".repeat(2)));
    }

    #[test]
    fn arguments_pretty_printed() {
        let call = ToolCall::new("c1", "read_file", r#"{"path":"a.txt"}"#);
        assert_eq!(pretty_arguments(&call), "{\n    \"path\": \"a.txt\"\n  }");

        let raw = ToolCall::new("c2", "bash", "not json");
        assert_eq!(pretty_arguments(&raw), "not json");
    }

    #[test]
    fn usage_accumulates_over_requests() {
        let mut observer = TerminalObserver::new();
        observer.on_usage(Usage {
            input_tokens: 3,
            output_tokens: 1,
        });
        observer.on_usage(Usage {
            input_tokens: 4,
            output_tokens: 2,
        });
        assert_eq!(observer.usage().total(), 10);
    }
}
