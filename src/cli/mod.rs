//! Command-line interface for vpnscan.
//!
//! Provides the long-running scanner plus offline helpers for checking the
//! classifier, the extension matcher and the resolved configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{GatewayClient, Platform};
use crate::config;
use crate::core::{classify, match_extension, ChatLogStore, RecordKind};
use crate::domain::Settings;
use crate::runtime::{Runtime, Shutdown};

/// vpnscan - forwards proxy configs found in channels to one destination
#[derive(Parser, Debug)]
#[command(name = "vpnscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and handle commands from saved messages
    Run,

    /// Classify text offline
    Classify {
        /// Comma-separated server types (defaults to the enabled set)
        #[arg(short, long)]
        types: Option<String>,

        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Check a file name against the extension list
    MatchFile {
        /// File name to check
        name: String,

        /// Comma-separated extensions (defaults to the enabled set)
        #[arg(short, long)]
        ext: Option<String>,
    },

    /// Show resolved configuration
    Config,

    /// Print the default settings record
    Defaults,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run => run_scanner().await,
            Commands::Classify { types, input } => classify_text(types, input),
            Commands::MatchFile { name, ext } => match_file(&name, ext),
            Commands::Config => show_config(),
            Commands::Defaults => {
                println!(
                    "{}",
                    ChatLogStore::compose(RecordKind::Settings, &Settings::default().to_record_body())
                );
                Ok(())
            }
        }
    }
}

/// Split a comma-separated flag value
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn run_scanner() -> Result<()> {
    let cfg = config::config()?;
    let gateway = cfg.gateway()?;
    tracing::info!(endpoint = %gateway.endpoint, session = %gateway.session, "Starting scanner");

    let platform: Arc<dyn Platform> = Arc::new(GatewayClient::from_config(gateway));
    let runtime = Runtime::new(platform, cfg.scanner.clone());

    let account = runtime.start().await?;
    eprintln!(
        "Connected as {} ({}). Send vpn:help to your saved messages.",
        account.username.as_deref().unwrap_or("unknown"),
        account.id
    );

    let reason = runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    match reason {
        Shutdown::Requested => eprintln!("Scanner stopped"),
        Shutdown::Disconnected => anyhow::bail!("Lost connection to the gateway"),
    }
    Ok(())
}

fn classify_text(types: Option<String>, input: Option<PathBuf>) -> Result<()> {
    let text = if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    } else {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    };

    let enabled = match types {
        Some(raw) => split_list(&raw),
        None => Settings::default().enabled_server_types().to_vec(),
    };

    let matches = classify(&text, &enabled);
    if matches.is_empty() {
        eprintln!("No server configs found");
        return Ok(());
    }
    for found in &matches {
        println!("[{}] {}", found.category, found.config);
    }
    eprintln!("\n{} match(es)", matches.len());
    Ok(())
}

fn match_file(name: &str, ext: Option<String>) -> Result<()> {
    let enabled = match ext {
        Some(raw) => split_list(&raw),
        None => Settings::default().enabled_file_extensions().to_vec(),
    };

    match match_extension(name, &enabled) {
        Some(extension) => println!("{} matches {}", name, extension),
        None => println!("{} does not match [{}]", name, enabled.join(", ")),
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("vpnscan configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Token: {}",
        if cfg.platform.token.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!();
    print!(
        "{}",
        serde_yaml::to_string(cfg).context("Failed to render configuration")?
    );
    Ok(())
}
