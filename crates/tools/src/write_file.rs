//! write_file tool: create or overwrite a workspace file.

use async_trait::async_trait;
use looper_core::error::ToolError;
use looper_core::tool::{Tool, ToolResult};
use looper_core::CancellationToken;
use tracing::debug;

use crate::path::Workspace;

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file if it doesn't exist, or overwrites it if it does. Creates parent directories as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
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
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let full = self.workspace.resolve(path)?;
        if full == self.workspace.root() {
            return Err(ToolError::ExecutionFailed(
                "path is a directory, not a file".into(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::ExecutionFailed(format!("failed to create directories: {e}"))
            })?;
        }

        let existed = tokio::fs::try_exists(&full).await.unwrap_or(false);
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to write file: {e}")))?;
        debug!(path = %full.display(), bytes = content.len(), existed, "Wrote file");

        let verb = if existed { "updated" } else { "created" };
        Ok(ToolResult::ok(format!("Successfully {verb} file: {path}")))
    }
}
