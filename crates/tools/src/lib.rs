//! Built-in tools for looper.
//!
//! Tools give the agent the ability to act on its workspace: read, write,
//! list and search files, and run code or commands in the sandbox.
//! File tools are confined to the workspace root; execution tools inherit
//! whatever restrictions the [`Sandbox`] enforces.

pub mod execute;
pub mod grep;
pub mod list_dir;
pub mod path;
pub mod read_file;
pub mod write_file;

use std::path::Path;
use std::sync::Arc;

use looper_core::error::ToolError;
use looper_core::tool::ToolRegistry;
use looper_sandbox::Sandbox;

pub use execute::{BashTool, ExecuteTool};
pub use grep::GrepTool;
pub use list_dir::ListDirTool;
pub use path::Workspace;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

/// Create a registry with all six built-in tools.
///
/// File tools are rooted at `workspace`; `execute` and `bash` run in
/// `sandbox`.
pub fn default_registry(
    workspace: impl AsRef<Path>,
    sandbox: Arc<dyn Sandbox>,
) -> Result<ToolRegistry, ToolError> {
    let workspace = Workspace::new(workspace);
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool::new(workspace.clone())))?;
    registry.register(Box::new(WriteFileTool::new(workspace.clone())))?;
    registry.register(Box::new(ListDirTool::new(workspace.clone())))?;
    registry.register(Box::new(GrepTool::new(workspace)))?;
    registry.register(Box::new(ExecuteTool::new(sandbox.clone())))?;
    registry.register(Box::new(BashTool::new(sandbox)))?;
    Ok(registry)
}
