//! Process-level sandbox.
//!
//! Each invocation spawns one child in its own process group with a rebuilt
//! environment. Output is drained concurrently so the child never blocks on a
//! full pipe, but only the first `max_output_bytes` of each stream are kept.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::blacklist::Blacklist;
use crate::config::{FALLBACK_PATH, SandboxConfig};
use crate::script::Interpreter;
use crate::{ExecutionResult, Sandbox, SandboxError};

/// How long to wait for output readers after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs commands as restricted child processes.
#[derive(Debug)]
pub struct ProcessSandbox {
    config: SandboxConfig,
    blacklist: Blacklist,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let blacklist = Blacklist::new(&config.blacklist);
        Self { config, blacklist }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn check_blacklist(&self, input: &str) -> Result<(), SandboxError> {
        match self.blacklist.check(input) {
            Some(pattern) => {
                warn!(pattern = %pattern, "Blocked by blacklist");
                Err(SandboxError::Blacklisted {
                    pattern: pattern.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    fn resolve_working_dir(&self) -> Result<PathBuf, SandboxError> {
        let raw = &self.config.working_dir;
        let dir = std::path::absolute(raw).map_err(|e| SandboxError::WorkingDir {
            path: raw.display().to_string(),
            reason: e.to_string(),
        })?;
        if !dir.is_dir() {
            return Err(SandboxError::WorkingDir {
                path: dir.display().to_string(),
                reason: "not a directory".into(),
            });
        }
        Ok(dir)
    }

    /// Allow-listed parent variables, then custom overrides, then a default
    /// `PATH` if neither supplied one.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = Vec::new();
        for key in &self.config.allowed_env {
            if let Ok(val) = std::env::var(key) {
                env.push((key.clone(), val));
            }
        }
        for (key, val) in &self.config.custom_env {
            env.push((key.clone(), val.clone()));
        }
        if !env.iter().any(|(k, _)| k == "PATH") {
            env.push(("PATH".into(), FALLBACK_PATH.into()));
        }
        env
    }

    async fn run(
        &self,
        mut cmd: Command,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let dir = self.resolve_working_dir()?;

        cmd.current_dir(&dir)
            .env_clear()
            .envs(self.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %label, dir = %dir.display(), "Spawning sandboxed process");

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            command: label.to_string(),
            source: e,
        })?;

        let pid = child.id();
        let limit = self.config.max_output_bytes;
        let stdout_task = tokio::spawn(capture(child.stdout.take(), limit));
        let stderr_task = tokio::spawn(capture(child.stderr.take(), limit));

        let timeout = self.config.timeout;
        let deadline = async {
            if timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(timeout).await
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = deadline => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        // Background jobs left in the group would otherwise hold the pipes open.
        terminate(&mut child, pid).await;
        let duration = start.elapsed();

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        let exit_code = match outcome {
            Outcome::Cancelled => {
                debug!(command = %label, "Sandboxed process cancelled");
                return Err(SandboxError::Cancelled);
            }
            Outcome::TimedOut => {
                warn!(command = %label, timeout_ms = timeout.as_millis() as u64, "Sandboxed process timed out");
                return Ok(ExecutionResult {
                    stdout,
                    stderr,
                    exit_code: -1,
                    duration,
                    timed_out: true,
                });
            }
            Outcome::Exited(Ok(status)) => status.code().unwrap_or(-1),
            Outcome::Exited(Err(e)) => {
                return Err(SandboxError::Spawn {
                    command: label.to_string(),
                    source: e,
                });
            }
        };

        debug!(command = %label, exit_code, duration_ms = duration.as_millis() as u64, "Sandboxed process finished");

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            duration,
            timed_out: false,
        })
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let full = format!("{} {}", command, args.join(" "));
        self.check_blacklist(&full)?;

        let mut cmd = Command::new(command);
        cmd.args(args);
        self.run(cmd, command, &cancel).await
    }

    async fn execute_script(
        &self,
        interpreter: &str,
        script: &str,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        self.check_blacklist(script)?;
        let interp = Interpreter::from_tag(interpreter)
            .ok_or_else(|| SandboxError::UnsupportedInterpreter(interpreter.to_string()))?;

        let source = interp.prepare(script);
        let mut file = tempfile::Builder::new()
            .prefix("looper-script-")
            .suffix(interp.extension())
            .tempfile()
            .map_err(SandboxError::Script)?;
        file.write_all(source.as_bytes())
            .and_then(|_| file.flush())
            .map_err(SandboxError::Script)?;

        // Removed when dropped, whatever happens below.
        let path = file.into_temp_path();

        #[cfg(unix)]
        if interp.is_shell() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .map_err(SandboxError::Script)?;
        }

        let mut cmd = Command::new(interp.program());
        cmd.args(interp.args(&path));
        let result = self.run(cmd, interp.program(), &cancel).await;
        drop(path);
        result
    }

    fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }
}

/// Kill the child's whole process group and reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; a group with no members yields ESRCH.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    let _ = child.kill().await;
}

async fn capture<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let Some(mut reader) = reader else {
        return kept;
    };
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

async fn collect(mut task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}
