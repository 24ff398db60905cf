//! Sandboxed execution tools.
//!
//! `execute` runs a code snippet through an interpreter, `bash` runs a single
//! command line. Both go through the [`Sandbox`], so the deny-list, timeout,
//! output cap and environment isolation all apply.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use looper_core::error::ToolError;
use looper_core::tool::{Tool, ToolResult};
use looper_core::CancellationToken;
use looper_sandbox::{ExecutionResult, Sandbox, SandboxError};
use tracing::{debug, warn};

const TIMEOUT_BANNER: &str = "⚠️ Execution timed out\n\n";

fn sandbox_error(e: SandboxError) -> ToolError {
    match e {
        SandboxError::Cancelled => ToolError::Cancelled,
        other => ToolError::ExecutionFailed(format!("execution failed: {other}")),
    }
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

/// STDOUT/STDERR sections followed by exit code and duration.
fn format_script_result(result: &ExecutionResult) -> String {
    let mut out = String::new();
    if result.timed_out {
        out.push_str(TIMEOUT_BANNER);
    }
    if !result.stdout.is_empty() {
        out.push_str("STDOUT:\n");
        push_block(&mut out, &result.stdout_text());
    }
    if !result.stderr.is_empty() {
        out.push_str("\nSTDERR:\n");
        push_block(&mut out, &result.stderr_text());
    }
    let _ = write!(out, "\nExit code: {}", result.exit_code);
    let _ = write!(out, "\nDuration: {:?}", result.duration);
    out
}

/// Raw stdout, then a STDERR section, then the exit code if non-zero.
fn format_command_result(result: &ExecutionResult) -> String {
    let mut out = String::new();
    if result.timed_out {
        out.push_str(TIMEOUT_BANNER);
    }
    if !result.stdout.is_empty() {
        push_block(&mut out, &result.stdout_text());
    }
    if !result.stderr.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("STDERR:\n");
        out.push_str(&result.stderr_text());
    }
    if result.exit_code != 0 {
        let _ = write!(out, "\nExit code: {}", result.exit_code);
    }
    out
}

fn to_tool_result(result: &ExecutionResult, output: String) -> ToolResult {
    if result.success() {
        ToolResult::ok(output)
    } else {
        ToolResult::failed(output)
    }
}

/// Runs code in the sandbox with a chosen interpreter.
pub struct ExecuteTool {
    sandbox: Arc<dyn Sandbox>,
}

impl ExecuteTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Execute code or shell commands in a sandboxed environment. Supports bash, python, node, and go."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "description": "The language/interpreter to use: 'bash', 'python', 'node', or 'go'",
                    "enum": ["bash", "python", "node", "go"]
                },
                "code": {
                    "type": "string",
                    "description": "The code to execute"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let language = arguments["language"]
            .as_str()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("language is required".into()))?;
        let code = arguments["code"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("code is required".into()))?;

        debug!(language, bytes = code.len(), "Executing script");
        let result = self
            .sandbox
            .execute_script(language, code, cancel)
            .await
            .map_err(sandbox_error)?;
        if result.timed_out {
            warn!(language, "Script timed out");
        }

        Ok(to_tool_result(&result, format_script_result(&result)))
    }
}

/// Runs one bash command line in the sandbox.
pub struct BashTool {
    sandbox: Arc<dyn Sandbox>,
}

impl BashTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command in a sandboxed environment."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;

        debug!(command = %command, "Executing bash command");
        let args = vec!["-c".to_string(), command.to_string()];
        let result = self
            .sandbox
            .execute("bash", &args, cancel)
            .await
            .map_err(sandbox_error)?;
        if result.exit_code != 0 {
            warn!(command = %command, exit_code = result.exit_code, "Command failed");
        }

        Ok(to_tool_result(&result, format_command_result(&result)))
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Records invocations and replays a canned result.
    struct ScriptedSandbox {
        result: Result<ExecutionResult, ()>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
        dir: PathBuf,
    }

    impl ScriptedSandbox {
        fn returning(result: ExecutionResult) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(result),
                calls: Mutex::new(Vec::new()),
                dir: PathBuf::from("/tmp"),
            })
        }

        fn blocked() -> Arc<Self> {
            Arc::new(Self {
                result: Err(()),
                calls: Mutex::new(Vec::new()),
                dir: PathBuf::from("/tmp"),
            })
        }

        fn reply(&self) -> Result<ExecutionResult, SandboxError> {
            self.result.clone().map_err(|_| SandboxError::Blacklisted {
                pattern: "rm -rf /".into(),
            })
        }
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        async fn execute(
            &self,
            command: &str,
            args: &[String],
            _cancel: CancellationToken,
        ) -> Result<ExecutionResult, SandboxError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));
            self.reply()
        }

        async fn execute_script(
            &self,
            interpreter: &str,
            script: &str,
            _cancel: CancellationToken,
        ) -> Result<ExecutionResult, SandboxError> {
            self.calls
                .lock()
                .unwrap()
                .push((interpreter.to_string(), vec![script.to_string()]));
            self.reply()
        }

        fn working_dir(&self) -> &Path {
            &self.dir
        }
    }

    fn result(stdout: &str, stderr: &str, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit_code,
            duration: Duration::from_millis(12),
            timed_out: false,
        }
    }

    #[tokio::test]
    async fn bash_passes_command_through() {
        let sandbox = ScriptedSandbox::returning(result("hello\n", "", 0));
        let tool = BashTool::new(sandbox.clone());
        let out = tool
            .execute(serde_json::json!({"command": "echo hello"}), CancellationToken::new())
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.output, "hello\n");
        let calls = sandbox.calls.lock().unwrap();
        assert_eq!(calls[0].0, "bash");
        assert_eq!(calls[0].1, vec!["-c".to_string(), "echo hello".to_string()]);
    }

    #[test]
    fn bash_format_with_stderr_and_exit_code() {
        let out = format_command_result(&result("out", "bad thing", 2));
        assert_eq!(out, "out\n\nSTDERR:\nbad thing\nExit code: 2");
    }

    #[test]
    fn script_format_sections() {
        let out = format_script_result(&result("42", "warn\n", 0));
        assert_eq!(
            out,
            "STDOUT:\n42\n\nSTDERR:\nwarn\n\nExit code: 0\nDuration: 12ms"
        );
    }

    #[test]
    fn truncated_character_is_decoded_for_the_report() {
        let mut r = result("", "", 0);
        r.stdout = "é".as_bytes()[..1].to_vec();
        assert_eq!(format_command_result(&r), "\u{FFFD}\n");
    }

    #[test]
    fn timeout_banner_leads() {
        let mut r = result("", "", -1);
        r.timed_out = true;
        let out = format_script_result(&r);
        assert!(out.starts_with(TIMEOUT_BANNER));
        assert!(out.contains("Exit code: -1"));
        assert!(format_command_result(&r).starts_with(TIMEOUT_BANNER));
    }

    #[tokio::test]
    async fn execute_uses_language_as_interpreter() {
        let sandbox = ScriptedSandbox::returning(result("4\n", "", 0));
        let tool = ExecuteTool::new(sandbox.clone());
        let out = tool
            .execute(
                serde_json::json!({"language": "python", "code": "2 + 2"}),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(out.output.starts_with("STDOUT:\n4\n"));
        assert_eq!(sandbox.calls.lock().unwrap()[0].0, "python");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failed_result() {
        let sandbox = ScriptedSandbox::returning(result("", "boom", 1));
        let tool = BashTool::new(sandbox);
        let out = tool
            .execute(serde_json::json!({"command": "false"}), CancellationToken::new())
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.output.ends_with("Exit code: 1"));
    }

    #[tokio::test]
    async fn blacklist_surfaces_as_tool_error() {
        let tool = BashTool::new(ScriptedSandbox::blocked());
        let err = tool
            .execute(serde_json::json!({"command": "rm -rf /"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("execution failed: command blocked"));
    }

    #[tokio::test]
    async fn empty_command_rejected() {
        let tool = BashTool::new(ScriptedSandbox::returning(result("", "", 0)));
        let err = tool
            .execute(serde_json::json!({"command": ""}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
