//! Sandbox configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on captured bytes per stream (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// `PATH` given to the child when neither the allow-list nor the custom
/// environment provides one.
pub const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Restrictions applied to every invocation of a [`crate::ProcessSandbox`].
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Directory commands run in; resolved to an absolute path at run time.
    pub working_dir: PathBuf,
    /// Zero disables the timeout.
    pub timeout: Duration,
    /// Parent environment variables passed through to the child.
    pub allowed_env: Vec<String>,
    /// Variables set on the child after the allow-listed ones.
    pub custom_env: BTreeMap<String, String>,
    /// Bytes kept per stream; the rest is read and dropped.
    pub max_output_bytes: usize,
    /// Deny-list patterns (`*` matches anything). Empty disables the check.
    pub blacklist: Vec<String>,
}

impl SandboxConfig {
    /// Defaults: 30s timeout, 1 MiB per stream, a minimal environment and
    /// the built-in deny-list.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            allowed_env: ["PATH", "HOME", "USER", "LANG", "LC_ALL"]
                .into_iter()
                .map(String::from)
                .collect(),
            custom_env: BTreeMap::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            blacklist: default_blacklist(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_allowed_env(mut self, names: Vec<String>) -> Self {
        self.allowed_env = names;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_env.insert(key.into(), value.into());
        self
    }

    pub fn with_blacklist(mut self, patterns: Vec<String>) -> Self {
        self.blacklist = patterns;
        self
    }

    /// Turn the deny-list off entirely.
    pub fn without_blacklist(mut self) -> Self {
        self.blacklist.clear();
        self
    }
}

/// Built-in deny-list of destructive or abusive command patterns.
pub fn default_blacklist() -> Vec<String> {
    [
        // Destructive file operations
        "rm -rf /",
        "rm -rf /*",
        "rm -rf ~",
        "rm -rf .",
        "rm -rf ..",
        "rm -fr /",
        "rm -fr /*",
        "> /dev/sda",
        "dd if=/dev/zero of=/dev/sda",
        "dd if=/dev/random of=/dev/sda",
        "mkfs.",
        "wipefs",
        // Fork bombs
        ":(){ :|:& };:",
        "fork while fork",
        // System manipulation
        "chmod -R 777 /",
        "chown -R",
        "shutdown",
        "reboot",
        "halt",
        "poweroff",
        "init 0",
        "init 6",
        "telinit 0",
        // Listeners
        "nc -l",
        // Download and execute
        "curl * | sh",
        "curl * | bash",
        "wget * | sh",
        "wget * | bash",
        // History tampering
        "history -c",
        "cat /dev/null >",
        "> ~/.bash_history",
        // Privilege escalation
        "sudo su",
        "sudo -i",
        "su -",
        "passwd",
        // Miners
        "xmrig",
        "minerd",
        "cpuminer",
        // Kernel modules
        "insmod",
        "rmmod",
        "modprobe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
