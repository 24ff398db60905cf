//! list_dir tool: directory listing, flat or recursive.

use std::path::Path;

use async_trait::async_trait;
use looper_core::error::ToolError;
use looper_core::tool::{Tool, ToolResult};
use looper_core::CancellationToken;

use crate::path::{Workspace, display_path};

const DEFAULT_MAX_DEPTH: usize = 3;

pub struct ListDirTool {
    workspace: Workspace,
}

impl ListDirTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Visible entries of `dir`, each as (name, is_dir).
fn visible_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        out.push((name, is_dir));
    }
    Ok(out)
}

fn list_recursive(
    base: &Path,
    rel: &Path,
    depth: usize,
    max_depth: usize,
    cancel: &CancellationToken,
    entries: &mut Vec<String>,
) -> Result<(), ToolError> {
    if depth > max_depth {
        return Ok(());
    }
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    // Unreadable subdirectories are skipped.
    let Ok(items) = visible_entries(&base.join(rel)) else {
        return Ok(());
    };

    for (name, is_dir) in items {
        let child = rel.join(&name);
        if is_dir {
            entries.push(format!("{}/", display_path(&child)));
            list_recursive(base, &child, depth + 1, max_depth, cancel, entries)?;
        } else {
            entries.push(display_path(&child));
        }
    }
    Ok(())
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory in the workspace. Shows files and subdirectories."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path relative to the workspace root. Defaults to workspace root."
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively. Defaults to false."
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum depth for recursive listing. Defaults to 3."
                }
            },
            "required": []
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"].as_str().unwrap_or("");
        let recursive = arguments["recursive"].as_bool().unwrap_or(false);
        let max_depth = arguments["max_depth"]
            .as_u64()
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_MAX_DEPTH);

        let full = self.workspace.resolve(path)?;
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::ExecutionFailed(format!(
                    "directory not found: {path}"
                )));
            }
            Err(e) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "cannot access directory: {e}"
                )));
            }
        };
        if !meta.is_dir() {
            return Err(ToolError::ExecutionFailed("path is not a directory".into()));
        }

        let task_cancel = cancel.clone();
        let mut entries = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            if recursive {
                list_recursive(&full, Path::new(""), 0, max_depth, &task_cancel, &mut entries)?;
            } else {
                let items = visible_entries(&full).map_err(|e| {
                    ToolError::ExecutionFailed(format!("failed to read directory: {e}"))
                })?;
                entries.extend(items.into_iter().map(|(name, is_dir)| {
                    if is_dir { format!("{name}/") } else { name }
                }));
            }
            Ok::<_, ToolError>(entries)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("listing task failed: {e}")))??;

        if entries.is_empty() {
            return Ok(ToolResult::ok("Directory is empty."));
        }
        entries.sort();
        Ok(ToolResult::ok(entries.join("\n")))
    }
}
