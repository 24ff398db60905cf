//! Looper CLI, the main entry point.
//!
//! Modes:
//! - `--prompt <text>` runs a single turn and exits
//! - `--list-skills` prints discovered skills and exits
//! - otherwise an interactive session on stdin

use std::path::{Path, PathBuf};

use clap::Parser;
use looper_config::AppConfig;

mod commands;
mod render;

#[derive(Parser, Debug)]
#[command(
    name = "looper",
    about = "Looper: an LLM agent with sandboxed tools",
    version,
    author
)]
struct Cli {
    /// Workspace directory for file tools and command execution
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// LLM provider (anthropic, openai)
    #[arg(long)]
    provider: Option<String>,

    /// Model name (defaults to the provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Run a single prompt instead of entering interactive mode
    #[arg(short, long)]
    prompt: Option<String>,

    /// Custom system prompt
    #[arg(long = "system")]
    system: Option<String>,

    /// Maximum model requests until the conversation is cleared (0 = unlimited)
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Disable the command deny-list (dangerous)
    #[arg(long)]
    no_blacklist: bool,

    /// Deny-list file, one pattern per line
    #[arg(long, value_name = "FILE", conflicts_with = "no_blacklist")]
    blacklist: Option<PathBuf>,

    /// List available skills and exit
    #[arg(long)]
    list_skills: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags win over the config file and environment.
    fn apply(&self, config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(workspace) = &self.workspace {
            config.workspace = workspace.clone();
        }
        if let Some(provider) = &self.provider {
            config.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(system) = &self.system {
            config.system_prompt = system.clone();
        }
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
        if self.no_blacklist {
            config.sandbox.disable_blacklist = true;
        }
        if let Some(path) = &self.blacklist {
            let patterns = looper_config::load_blacklist_file(path)
                .map_err(|e| format!("Error loading blacklist file: {e}"))?;
            config.sandbox.blacklist = Some(patterns);
        }
        config.validate()?;
        Ok(())
    }
}

/// Load `KEY=value` pairs from `path` into the process environment.
/// Variables that are already set keep their values.
fn load_env_file(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok().map(|()| path.to_path_buf())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = load_env_file(Path::new(".env"));
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with the answer on stdout
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    cli.apply(&mut config)?;
    tracing::debug!(?config, "Configuration loaded");

    if cli.list_skills {
        return commands::skills::list(&config);
    }

    match cli.prompt {
        Some(prompt) => commands::agent::run_once(&config, &prompt).await,
        None => commands::agent::run_interactive(&config).await,
    }
}
