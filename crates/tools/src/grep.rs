//! grep tool: regex search across workspace files.

use std::path::Path;

use async_trait::async_trait;
use looper_core::error::ToolError;
use looper_core::tool::{Tool, ToolResult};
use looper_core::CancellationToken;
use regex_lite::Regex;

use crate::path::Workspace;

const DEFAULT_MAX_RESULTS: usize = 100;
/// Larger files are skipped.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct GrepTool {
    workspace: Workspace,
}

impl GrepTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

/// Compile a file-name glob (`*`, `?`, `[...]`) into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex, regex_lite::Error> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' => {
                pattern.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    pattern.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' || c == '[' {
                        pattern.push('\\');
                    }
                    pattern.push(c);
                }
                pattern.push(']');
            }
            other => pattern.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

struct Search<'a> {
    workspace: &'a Workspace,
    regex: Regex,
    include: Option<Regex>,
    max_results: usize,
    results: Vec<String>,
    cancel: CancellationToken,
}

enum Walk {
    Continue,
    Stop,
}

impl Search<'_> {
    fn visit(&mut self, path: &Path, is_root: bool) -> Result<Walk, ToolError> {
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(Walk::Continue);
        };
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));

        if meta.is_dir() {
            if hidden && !is_root {
                return Ok(Walk::Continue);
            }
            let Ok(read) = std::fs::read_dir(path) else {
                return Ok(Walk::Continue);
            };
            let mut children: Vec<_> = read.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            children.sort();
            for child in children {
                if let Walk::Stop = self.visit(&child, false)? {
                    return Ok(Walk::Stop);
                }
            }
            return Ok(Walk::Continue);
        }

        if hidden || meta.len() > MAX_FILE_SIZE {
            return Ok(Walk::Continue);
        }
        if let Some(include) = &self.include {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !include.is_match(&name) {
                return Ok(Walk::Continue);
            }
        }
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let Ok(bytes) = std::fs::read(path) else {
            return Ok(Walk::Continue);
        };
        let content = String::from_utf8_lossy(&bytes);
        let rel = self.workspace.relative(path);

        for (i, line) in content.lines().enumerate() {
            if !self.regex.is_match(line) {
                continue;
            }
            self.results.push(format!("{rel}:{}: {line}", i + 1));
            if self.results.len() >= self.max_results {
                self.results.push(format!(
                    "\n... truncated (showing {} of potentially more results)",
                    self.max_results
                ));
                return Ok(Walk::Stop);
            }
        }
        Ok(Walk::Continue)
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a regex pattern in files within the workspace. Returns matching lines with file paths and line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "The file or directory path to search in (relative to workspace root). Defaults to workspace root."
                },
                "include": {
                    "type": "string",
                    "description": "File pattern to include (e.g., '*.rs', '*.py'). Defaults to all files."
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Whether to perform case-insensitive matching"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return. Defaults to 100."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("pattern is required".into()))?;
        let root = self
            .workspace
            .resolve(arguments["path"].as_str().unwrap_or(""))?;

        let flags = if arguments["case_insensitive"].as_bool().unwrap_or(false) {
            "(?i)"
        } else {
            ""
        };
        let regex = Regex::new(&format!("{flags}{pattern}"))
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex pattern: {e}")))?;
        let include = match arguments["include"].as_str().filter(|s| !s.is_empty()) {
            Some(glob) => Some(glob_to_regex(glob).map_err(|e| {
                ToolError::InvalidArguments(format!("invalid include pattern: {e}"))
            })?),
            None => None,
        };
        let max_results = arguments["max_results"]
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let workspace = self.workspace.clone();
        let results = tokio::task::spawn_blocking(move || {
            let mut search = Search {
                workspace: &workspace,
                regex,
                include,
                max_results,
                results: Vec::new(),
                cancel,
            };
            search.visit(&root, true)?;
            Ok::<_, ToolError>(search.results)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("search failed: {e}")))??;

        if results.is_empty() {
            return Ok(ToolResult::ok("No matches found."));
        }
        Ok(ToolResult::ok(results.join("\n")))
    }
}
