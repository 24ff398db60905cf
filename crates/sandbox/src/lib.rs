//! Sandboxed command execution for Looper.
//!
//! Provides:
//! - **Deny-list**: glob-style patterns that block a command line or script
//!   before anything is spawned
//! - **Process sandbox**: rebuilt environment, fixed working directory,
//!   per-invocation timeout and capped output capture
//! - **Scripts**: interpreter selection and REPL-style wrapping of bare
//!   Python expressions

pub mod blacklist;
pub mod config;
pub mod process;
pub mod script;

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use blacklist::Blacklist;
pub use config::{SandboxConfig, default_blacklist};
pub use process::ProcessSandbox;
pub use script::Interpreter;

/// Outcome of one sandboxed invocation.
///
/// A process that fails, exits non-zero or times out still produces a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Raw stdout, at most `max_output_bytes` long.
    pub stdout: Vec<u8>,
    /// Raw stderr, at most `max_output_bytes` long.
    pub stderr: Vec<u8>,
    /// Process exit code; -1 on timeout or termination by signal.
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Stdout decoded for display. A character split by the cap becomes U+FFFD.
    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Infrastructure failures. Anything the child process itself does is
/// reported through [`ExecutionResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("command blocked by blacklist: matches pattern \"{pattern}\"")]
    Blacklisted { pattern: String },

    #[error("unsupported interpreter: {0}")]
    UnsupportedInterpreter(String),

    #[error("invalid working directory '{path}': {reason}")]
    WorkingDir { path: String, reason: String },

    #[error("failed to prepare script: {0}")]
    Script(#[source] std::io::Error),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("execution cancelled")]
    Cancelled,
}

/// A place to run commands and scripts under restrictions.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `command` with `args`.
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError>;

    /// Write `script` to a temp file and run it with `interpreter`
    /// (`bash`, `sh`, `python`, `python3`, `node`, `nodejs` or `go`).
    async fn execute_script(
        &self,
        interpreter: &str,
        script: &str,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError>;

    /// The configured working directory.
    fn working_dir(&self) -> &Path;
}
