//! Single-prompt and interactive chat modes.

use std::io::Write;

use looper_agent::Agent;
use looper_config::AppConfig;
use looper_core::{CancellationToken, Error};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render::{self, TerminalObserver};

/// A slash command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Quit,
    Clear,
    Skills,
    Tools,
    Help,
    Unknown(String),
}

impl Command {
    fn parse(input: &str) -> Option<Self> {
        let word = input.split_whitespace().next()?;
        if !word.starts_with('/') {
            return None;
        }
        Some(match word.to_lowercase().as_str() {
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/skills" => Self::Skills,
            "/tools" => Self::Tools,
            "/help" => Self::Help,
            _ => Self::Unknown(word.to_string()),
        })
    }
}

const HELP: &str = "Commands:
  /quit, /exit  - Exit the agent
  /clear        - Clear conversation history
  /skills       - List loaded skills
  /tools        - List available tools
  /help         - Show this help
";

fn build_agent(config: &AppConfig) -> Result<Agent, Box<dyn std::error::Error>> {
    if config.api_key_for(&config.provider).is_none() {
        let var = match config.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        eprintln!();
        eprintln!("  ERROR: No API key configured for {}!", config.provider);
        eprintln!();
        eprintln!("  Set {var} (or LOOPER_API_KEY), or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    Ok(Agent::from_config(config)?)
}

/// Run one turn, cancelling it if Ctrl-C arrives first.
async fn run_turn(
    agent: &mut Agent,
    input: &str,
    observer: &mut TerminalObserver,
) -> looper_core::Result<String> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = agent.run_stream(input, cancel, observer).await;
    watcher.abort();
    result
}

/// `looper --prompt <text>`
pub async fn run_once(config: &AppConfig, prompt: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut agent = build_agent(config)?;
    let mut observer = TerminalObserver::new();

    match run_turn(&mut agent, prompt, &mut observer).await {
        Ok(_) => {
            println!();
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{}", render::error_line(&e.to_string()));
            std::process::exit(1);
        }
    }
}

/// Interactive session on stdin.
pub async fn run_interactive(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut agent = build_agent(config)?;

    println!("\x1b[1m\x1b[36mLooper AI Agent{}", render::RESET);
    println!("===============");
    println!("{}", render::dim(&format!("Workspace: {}", agent.context().workspace().display())));
    println!("{}", render::dim(&format!("Provider:  {}", agent.provider().name())));
    println!("{}", render::dim(&format!("Tools:     {}", agent.tools().names().join(", "))));
    println!();
    println!("Type your message and press Enter. {HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", render::user_label());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted. Exiting...");
                return Ok(());
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = Command::parse(input) {
            if !handle_command(&mut agent, command) {
                break;
            }
            continue;
        }

        println!();
        print!("{}", render::assistant_label());
        std::io::stdout().flush()?;

        let mut observer = TerminalObserver::new();
        match run_turn(&mut agent, input, &mut observer).await {
            Ok(_) => {
                println!();
                let total = agent.context().usage();
                println!(
                    "{}\n",
                    render::dim(&format!(
                        "[Tokens: {} in / {} out | Iterations: {}]",
                        total.input_tokens,
                        total.output_tokens,
                        agent.context().iterations()
                    ))
                );
            }
            Err(Error::Cancelled) => {
                println!("\n{}\n", render::dim("[Cancelled]"));
            }
            Err(e) => {
                println!("\n{}\n", render::error_line(&e.to_string()));
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Returns `false` when the session should end.
fn handle_command(agent: &mut Agent, command: Command) -> bool {
    match command {
        Command::Quit => return false,
        Command::Clear => {
            agent.reset();
            println!("Conversation cleared.\n");
        }
        Command::Skills => {
            let skills: Vec<_> = agent.context().skills().collect();
            if skills.is_empty() {
                println!("No skills loaded.\n");
            } else {
                println!("Loaded Skills:");
                for skill in skills {
                    println!("  - {}: {}", skill.name, skill.description);
                }
                println!();
            }
        }
        Command::Tools => {
            println!("Available Tools:");
            for tool in agent.tools().list() {
                println!("  - {}: {}", tool.name(), tool.description());
            }
            println!();
        }
        Command::Help => println!("{HELP}"),
        Command::Unknown(word) => {
            println!("Unknown command: {word}. Type /help for available commands.\n");
        }
    }
    true
}
