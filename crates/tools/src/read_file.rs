//! read_file tool: numbered file contents, optionally a line range.

use async_trait::async_trait;
use looper_core::error::ToolError;
use looper_core::tool::{Tool, ToolResult};
use looper_core::CancellationToken;

use crate::path::Workspace;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

/// Render lines `start..=end` (1-based, zero meaning unbounded) as `%6d|text`.
fn number_lines(content: &str, start: usize, end: usize) -> String {
    let lines: Vec<String> = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(n, _)| start == 0 || *n >= start)
        .take_while(|(n, _)| end == 0 || *n <= end)
        .map(|(n, line)| format!("{n:6}|{line}"))
        .collect();

    if lines.is_empty() {
        if start > 0 || end > 0 {
            return "No lines in the specified range.".into();
        }
        return "File is empty.".into();
    }
    lines.join("\n")
}

fn line_arg(arguments: &serde_json::Value, key: &str) -> usize {
    arguments[key]
        .as_i64()
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(0)
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the workspace. Can optionally read specific line ranges."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path relative to the workspace root"
                },
                "start_line": {
                    "type": "integer",
                    "description": "The starting line number (1-indexed). If not provided, reads from the beginning."
                },
                "end_line": {
                    "type": "integer",
                    "description": "The ending line number (inclusive). If not provided, reads to the end."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;
        let full = self.workspace.resolve(path)?;

        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::ExecutionFailed(format!("file not found: {path}")));
            }
            Err(e) => {
                return Err(ToolError::ExecutionFailed(format!("cannot access file: {e}")));
            }
        };
        if meta.is_dir() {
            return Err(ToolError::ExecutionFailed(
                "path is a directory, not a file".into(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read file: {e}")))?;
        let content = String::from_utf8_lossy(&bytes);

        let start = line_arg(&arguments, "start_line");
        let end = line_arg(&arguments, "end_line");
        Ok(ToolResult::ok(number_lines(&content, start, end)))
    }
}
