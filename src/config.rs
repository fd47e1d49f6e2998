//! Configuration for the scanner process.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VPNSCAN_ENDPOINT, VPNSCAN_TOKEN, VPNSCAN_SESSION)
//! 2. Config file (.vpnscan/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .vpnscan/config.yaml
//! - Falls back to ~/.vpnscan/config.yaml
//!
//! Runtime options the operator changes from chat (scan interval, enabled
//! types and so on) are not part of this file; they live in the settings
//! record in saved messages.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::telegram::default_session;
use crate::adapters::GatewayConfig;
use crate::core::interpreter::DEFAULT_GROUPS_LIMIT;
use crate::core::journal::DEFAULT_LOG_CHANNEL_TITLE;
use crate::core::record_store::DEFAULT_LOOKBACK;
use crate::core::ScanTiming;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_ENDPOINT: &str = "VPNSCAN_ENDPOINT";
pub const ENV_TOKEN: &str = "VPNSCAN_TOKEN";
pub const ENV_SESSION: &str = "VPNSCAN_SESSION";

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8081";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub scanner: ScannerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformSection {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScannerSection {
    pub record_lookback: Option<usize>,
    pub error_backoff_seconds: Option<u64>,
    pub restart_pause_seconds: Option<u64>,
    pub command_poll_millis: Option<u64>,
    pub log_channel_title: Option<String>,
    pub groups_limit: Option<usize>,
}

/// Resolved configuration
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub platform: PlatformSettings,
    pub scanner: ScannerSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformSettings {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub session: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerSettings {
    /// Saved messages examined when looking for a record
    pub record_lookback: usize,
    pub error_backoff_seconds: u64,
    pub restart_pause_seconds: u64,
    /// Poll interval for new saved messages
    pub command_poll_millis: u64,
    pub log_channel_title: String,
    pub groups_limit: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        let timing = ScanTiming::default();
        Self {
            record_lookback: DEFAULT_LOOKBACK,
            error_backoff_seconds: timing.error_backoff.as_secs(),
            restart_pause_seconds: timing.restart_pause.as_secs(),
            command_poll_millis: 1000,
            log_channel_title: DEFAULT_LOG_CHANNEL_TITLE.to_string(),
            groups_limit: DEFAULT_GROUPS_LIMIT,
        }
    }
}

impl ScannerSettings {
    pub fn timing(&self) -> ScanTiming {
        ScanTiming {
            error_backoff: Duration::from_secs(self.error_backoff_seconds),
            restart_pause: Duration::from_secs(self.restart_pause_seconds),
        }
    }

    pub fn command_poll(&self) -> Duration {
        Duration::from_millis(self.command_poll_millis.max(1))
    }
}

impl ResolvedConfig {
    /// Gateway connection settings. Fails when no token is configured.
    pub fn gateway(&self) -> Result<GatewayConfig> {
        let token = self
            .platform
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .with_context(|| {
                format!(
                    "No gateway token configured (set {} or platform.token)",
                    ENV_TOKEN
                )
            })?;

        Ok(GatewayConfig {
            endpoint: self.platform.endpoint.clone(),
            token,
            session: self.platform.session.clone(),
        })
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(".vpnscan").join("config.yaml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    let home_config = dirs::home_dir()?.join(".vpnscan").join("config.yaml");
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge file contents, environment and defaults
fn resolve<E>(file: ConfigFile, config_file: Option<PathBuf>, env: E) -> ResolvedConfig
where
    E: Fn(&str) -> Option<String>,
{
    let defaults = ScannerSettings::default();
    let scanner = file.scanner;

    let platform = PlatformSettings {
        endpoint: env(ENV_ENDPOINT)
            .or(file.platform.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        token: env(ENV_TOKEN).or(file.platform.token),
        session: env(ENV_SESSION)
            .or(file.platform.session)
            .unwrap_or_else(default_session),
    };

    ResolvedConfig {
        config_file,
        platform,
        scanner: ScannerSettings {
            record_lookback: scanner.record_lookback.unwrap_or(defaults.record_lookback),
            error_backoff_seconds: scanner
                .error_backoff_seconds
                .unwrap_or(defaults.error_backoff_seconds),
            restart_pause_seconds: scanner
                .restart_pause_seconds
                .unwrap_or(defaults.restart_pause_seconds),
            command_poll_millis: scanner
                .command_poll_millis
                .unwrap_or(defaults.command_poll_millis),
            log_channel_title: scanner
                .log_channel_title
                .unwrap_or(defaults.log_channel_title),
            groups_limit: scanner.groups_limit.unwrap_or(defaults.groups_limit),
        },
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(file, config_file, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (bypasses the cache)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
