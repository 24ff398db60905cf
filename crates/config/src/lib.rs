//! Configuration loading, validation, and management for Looper.
//!
//! Loads configuration from `~/.looper/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use looper_sandbox::SandboxConfig;

/// Provider ids with a built-in adapter.
pub const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai"];

/// The root configuration structure.
///
/// Maps directly to `~/.looper/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key, used when no provider-specific key is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider id ("anthropic" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name; empty means the provider's default
    #[serde(default)]
    pub model: String,

    /// Root directory for file tools and command execution
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Base system prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Model requests allowed until the next reset (0 = unlimited)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Command execution settings
    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Skill discovery settings
    #[serde(default)]
    pub skills: SkillsConfig,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_iterations() -> u32 {
    50
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

/// Base instructions given to the model when none are configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant with access to tools for reading, writing, and executing code in a workspace environment. You can help users with various coding tasks.

## Core Capabilities
- Read and write files in the workspace
- Search for patterns in files (grep)
- List directory contents
- Execute code in bash, Python, Node.js, or Go

## Workflow
1. Understand what the user wants to accomplish
2. Explore the codebase using read_file, grep, and list_dir
3. Make changes carefully using write_file
4. Test changes using the execute tool when appropriate

Always explain what you're doing and why.";

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("workspace", &self.workspace)
            .field("max_iterations", &self.max_iterations)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("providers", &self.providers)
            .field("sandbox", &self.sandbox)
            .field("skills", &self.skills)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when the top-level `model` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_allowed_env")]
    pub allowed_env: Vec<String>,

    #[serde(default)]
    pub custom_env: BTreeMap<String, String>,

    /// Replaces the built-in deny-list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<String>>,

    /// Turn the deny-list off entirely
    #[serde(default)]
    pub disable_blacklist: bool,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_output_bytes() -> usize {
    1024 * 1024
}
fn default_allowed_env() -> Vec<String> {
    ["PATH", "HOME", "USER", "LANG", "LC_ALL"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            allowed_env: default_allowed_env(),
            custom_env: BTreeMap::new(),
            blacklist: None,
            disable_blacklist: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Skill directory; defaults to `<workspace>/skills`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default location, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `LOOPER_*` overrides and the generic `LOOPER_API_KEY`.
    ///
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(provider) = get("LOOPER_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = get("LOOPER_MODEL") {
            self.model = model;
        }
        if let Some(workspace) = get("LOOPER_WORKSPACE") {
            self.workspace = PathBuf::from(workspace);
        }
        if self.api_key.is_none() {
            self.api_key = get("LOOPER_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".looper")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be greater than 0".into(),
            ));
        }

        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected one of: {})",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }

    /// API key for `provider`: the provider section, then the vendor
    /// environment variable, then the top-level key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.api_key_with(provider, |key| std::env::var(key).ok())
    }

    fn api_key_with(
        &self,
        provider: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        let from_section = self
            .providers
            .get(provider)
            .and_then(|p| p.api_key.clone());
        let from_env = match provider {
            "anthropic" => lookup("ANTHROPIC_API_KEY"),
            "openai" => lookup("OPENAI_API_KEY"),
            _ => None,
        };
        from_section
            .or(from_env)
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    /// Base URL override for `provider`, if any.
    pub fn base_url_for(&self, provider: &str) -> Option<String> {
        self.providers.get(provider).and_then(|p| p.base_url.clone())
    }

    /// Model to request: the top-level model, else the provider section's.
    /// Empty means the adapter's default.
    pub fn model_for(&self, provider: &str) -> String {
        if !self.model.is_empty() {
            return self.model.clone();
        }
        self.providers
            .get(provider)
            .and_then(|p| p.model.clone())
            .unwrap_or_default()
    }

    /// The deny-list in effect: none if disabled, the configured list if
    /// set, the built-in list otherwise.
    pub fn resolved_blacklist(&self) -> Vec<String> {
        if self.sandbox.disable_blacklist {
            return Vec::new();
        }
        match &self.sandbox.blacklist {
            Some(patterns) => patterns.clone(),
            None => looper_sandbox::default_blacklist(),
        }
    }

    /// Sandbox settings rooted at the workspace.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            working_dir: self.workspace.clone(),
            timeout: Duration::from_secs(self.sandbox.timeout_secs),
            allowed_env: self.sandbox.allowed_env.clone(),
            custom_env: self.sandbox.custom_env.clone(),
            max_output_bytes: self.sandbox.max_output_bytes,
            blacklist: self.resolved_blacklist(),
        }
    }

    /// Directory skills are discovered in.
    pub fn skills_dir(&self) -> PathBuf {
        self.skills
            .dir
            .clone()
            .unwrap_or_else(|| self.workspace.join("skills"))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: String::new(),
            workspace: default_workspace(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            providers: HashMap::new(),
            sandbox: SandboxSettings::default(),
            skills: SkillsConfig::default(),
        }
    }
}

/// Read a deny-list file: one pattern per line, blank lines and `#`
/// comments skipped.
pub fn load_blacklist_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.sandbox.timeout_secs, 30);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = AppConfig {
            provider: "gemini".into(),
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, "anthropic");
    }

    #[test]
    fn parses_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
provider = "openai"
max_iterations = 5

[providers.openai]
api_key = "sk-test"
base_url = "http://localhost:8080/v1"
model = "gpt-4o-mini"

[sandbox]
timeout_secs = 5
blacklist = ["danger"]
custom_env = { FOO = "bar" }

[skills]
dir = "/opt/skills"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.model_for("openai"), "gpt-4o-mini");
        assert_eq!(
            config.base_url_for("openai").as_deref(),
            Some("http://localhost:8080/v1")
        );
        assert_eq!(config.resolved_blacklist(), vec!["danger".to_string()]);
        assert_eq!(config.skills_dir(), PathBuf::from("/opt/skills"));

        let sandbox = config.sandbox_config();
        assert_eq!(sandbox.timeout, Duration::from_secs(5));
        assert_eq!(sandbox.custom_env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("LOOPER_PROVIDER", "openai"),
            ("LOOPER_MODEL", "gpt-4o"),
            ("LOOPER_WORKSPACE", "/work"),
            ("LOOPER_API_KEY", "generic"),
        ]));
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.workspace, PathBuf::from("/work"));
        assert_eq!(config.api_key.as_deref(), Some("generic"));
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("LOOPER_PROVIDER", "")]));
        assert_eq!(config.provider, "anthropic");
    }

    #[test]
    fn api_key_precedence() {
        let mut config = AppConfig {
            api_key: Some("generic".into()),
            ..AppConfig::default()
        };
        let vendor = env(&[("ANTHROPIC_API_KEY", "from-env")]);
        assert_eq!(
            config.api_key_with("anthropic", &vendor).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            config.api_key_with("openai", &vendor).as_deref(),
            Some("generic")
        );

        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("from-file".into()),
                ..ProviderConfig::default()
            },
        );
        assert_eq!(
            config.api_key_with("anthropic", &vendor).as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn blacklist_resolution() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.resolved_blacklist(),
            looper_sandbox::default_blacklist()
        );

        config.sandbox.blacklist = Some(vec![]);
        assert!(config.resolved_blacklist().is_empty());

        config.sandbox.blacklist = Some(vec!["x".into()]);
        config.sandbox.disable_blacklist = true;
        assert!(config.resolved_blacklist().is_empty());
    }

    #[test]
    fn blacklist_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.txt");
        std::fs::write(&path, "# header\nrm -rf /\n\n  curl * | sh  \n#tail\n").unwrap();
        let patterns = load_blacklist_file(&path).unwrap();
        assert_eq!(patterns, vec!["rm -rf /", "curl * | sh"]);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-other".into()),
                ..ProviderConfig::default()
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("sk-other"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_model_is_adapter_choice() {
        let config = AppConfig::default();
        assert!(config.model_for("anthropic").is_empty());
    }
}
