//! Operator command interpreter.
//!
//! Commands are messages the operator writes into saved messages. They are
//! handled strictly one at a time; every recognised command message is
//! deleted afterwards to keep the history clean.
//!
//! Settings can be changed with `vpn:set KEY = VALUE` or with a bare
//! single-line `KEY = VALUE` whose key is an upper-case identifier. Any other
//! text containing `=` is left alone.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{ChatMessage, DialogKind, Peer, Platform};
use crate::domain::settings::SCHEMA;
use crate::domain::{Settings, SettingsError};

use super::journal::Journal;
use super::orchestrator::Orchestrator;
use super::patterns;
use super::record_store::{save_settings, save_target, RecordStore};

/// Prefix shared by all commands
pub const COMMAND_PREFIX: &str = "vpn:";

/// Default number of groups listed by `vpn:groups`
pub const DEFAULT_GROUPS_LIMIT: usize = 20;

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Status,
    Settings,
    Groups,
    ToggleFiles,
    Help,
    SetTarget(i64),
    EnableServer(String),
    DisableServer(String),
    SetSetting { key: String, value: String },
}

/// Errors surfaced to the operator as a reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument for {command}, usage: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },

    #[error("Invalid group ID format: {0}")]
    InvalidTarget(String),

    #[error("Unknown server type: {0}")]
    UnknownServerType(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not a command
    Ignored,
    /// Command executed
    Executed(Command),
    /// Command recognised but rejected
    Rejected(CommandError),
}

/// Parse a message text into a command.
///
/// Returns `None` for text that is not addressed to the scanner.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();

    if text.starts_with(COMMAND_PREFIX) {
        return Some(parse_prefixed(text));
    }

    if is_settings_line(text) {
        let (key, value) = text.split_once('=')?;
        return Some(Ok(Command::SetSetting {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        }));
    }

    None
}

fn parse_prefixed(text: &str) -> Result<Command, CommandError> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();
    let name = &head[COMMAND_PREFIX.len()..];

    let argument = |command: &'static str, usage: &'static str| {
        rest.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or(CommandError::MissingArgument { command, usage })
    };

    match name {
        "start" => Ok(Command::Start),
        "stop" => Ok(Command::Stop),
        "restart" => Ok(Command::Restart),
        "status" => Ok(Command::Status),
        "settings" => Ok(Command::Settings),
        "groups" => Ok(Command::Groups),
        "toggle_files" => Ok(Command::ToggleFiles),
        "help" => Ok(Command::Help),
        "set_target" => {
            let raw = argument("vpn:set_target", "vpn:set_target GROUP_ID")?;
            raw.parse::<i64>()
                .map(Command::SetTarget)
                .map_err(|_| CommandError::InvalidTarget(raw))
        }
        "enable_server" => Ok(Command::EnableServer(argument(
            "vpn:enable_server",
            "vpn:enable_server TYPE",
        )?)),
        "disable_server" => Ok(Command::DisableServer(argument(
            "vpn:disable_server",
            "vpn:disable_server TYPE",
        )?)),
        "set" => {
            let (key, value) = rest.split_once('=').ok_or(CommandError::MissingArgument {
                command: "vpn:set",
                usage: "vpn:set KEY = VALUE",
            })?;
            Ok(Command::SetSetting {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            })
        }
        _ => Err(CommandError::UnknownCommand(head.to_string())),
    }
}

/// Single line of the form `UPPER_KEY = value`
fn is_settings_line(text: &str) -> bool {
    if text.contains('\n') {
        return false;
    }
    let Some((key, _)) = text.split_once('=') else {
        return false;
    };
    let key = key.trim();
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Command reference shown by `vpn:help` and at startup
pub fn help_text() -> String {
    format!(
        "**Available Commands:**\n\
         • `{p}groups` - List available groups\n\
         • `{p}set_target GROUP_ID` - Set target group\n\
         • `{p}start` - Start scanning\n\
         • `{p}stop` - Stop scanning\n\
         • `{p}status` - Show status\n\
         • `{p}settings` - Show settings\n\
         • `{p}toggle_files` - Toggle file forwarding\n\
         • `{p}enable_server TYPE` / `{p}disable_server TYPE` - Edit server types\n\
         • `{p}restart` - Restart scanner\n\
         • `KEY = VALUE` or `{p}set KEY = VALUE` - Change a setting",
        p = COMMAND_PREFIX
    )
}

/// Settings display for `vpn:settings`
pub fn settings_text(settings: &Settings) -> String {
    let mut text = String::from("⚙️ **Current Settings**\n\n");
    for spec in SCHEMA {
        if let Some(value) = settings.get(spec.key) {
            text.push_str(&format!("• {}: {}\n", spec.key, value));
        }
    }
    text.push_str(&format!(
        "\n**Known server types:** {}\n\n**To change settings, send:**\n`SCAN_INTERVAL = 120`\n`ENABLED_SERVER_TYPES = vmess,vless,trojan`",
        patterns::category_names().join(", ")
    ));
    text
}

/// Sequential command handler
pub struct Interpreter {
    platform: Arc<dyn Platform>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn RecordStore>,
    journal: Arc<Journal>,
    groups_limit: usize,
}

impl Interpreter {
    pub fn new(
        platform: Arc<dyn Platform>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn RecordStore>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            platform,
            orchestrator,
            store,
            journal,
            groups_limit: DEFAULT_GROUPS_LIMIT,
        }
    }

    pub fn with_groups_limit(mut self, limit: usize) -> Self {
        self.groups_limit = limit;
        self
    }

    /// Handle one inbound saved message
    pub async fn handle(&self, message: &ChatMessage) -> Handled {
        if !message.outgoing {
            return Handled::Ignored;
        }
        let Some(parsed) = message.text().and_then(parse) else {
            return Handled::Ignored;
        };

        let handled = match parsed {
            Ok(command) => {
                debug!(?command, "Executing command");
                match self.execute(&command).await {
                    Ok(()) => Handled::Executed(command),
                    Err(e) => Handled::Rejected(e),
                }
            }
            Err(e) => Handled::Rejected(e),
        };

        if let Handled::Rejected(e) = &handled {
            info!(error = %e, "Command rejected");
            self.journal.reply(&format!("❌ {}", e)).await;
        }

        if let Err(e) = self
            .platform
            .delete_message(Peer::SavedMessages, message.id)
            .await
        {
            warn!(message_id = message.id, error = %e, "Failed to delete command message");
        }

        handled
    }

    async fn execute(&self, command: &Command) -> Result<(), CommandError> {
        let state = self.orchestrator.state();

        match command {
            Command::Start => {
                self.orchestrator.start().await;
            }
            Command::Stop => {
                self.orchestrator.stop().await;
            }
            Command::Restart => {
                self.orchestrator.restart().await;
            }
            Command::Status => {
                let report = self.orchestrator.status_report().await;
                self.journal.log(&report).await;
            }
            Command::Settings => {
                let settings = state.settings().await;
                self.journal.reply(&settings_text(&settings)).await;
            }
            Command::Help => {
                self.journal.reply(&help_text()).await;
            }
            Command::Groups => self.list_groups().await,
            Command::SetTarget(target) => {
                state.set_target(*target).await;
                let entry = match save_target(self.store.as_ref(), *target).await {
                    Ok(()) => format!("✅ **Target group set to:** {}", target),
                    Err(e) => {
                        warn!(error = %e, "Failed to save target group");
                        format!(
                            "⚠️ **Target group set to {} for this session only.** Error saving target group: {}",
                            target, e
                        )
                    }
                };
                self.journal.log(&entry).await;
            }
            Command::ToggleFiles => {
                let enabled = state.update_settings(|s| s.toggle_file_forwarding()).await;
                self.persist_settings().await;
                let status = if enabled { "enabled" } else { "disabled" };
                self.journal
                    .log(&format!("📁 **File forwarding {}**", status))
                    .await;
            }
            Command::EnableServer(name) | Command::DisableServer(name) => {
                let category = patterns::category(name)
                    .ok_or_else(|| CommandError::UnknownServerType(name.clone()))?;
                let enable = matches!(command, Command::EnableServer(_));
                let changed = state
                    .update_settings(|s| {
                        if enable {
                            s.enable_server_type(category.name)
                        } else {
                            s.disable_server_type(category.name)
                        }
                    })
                    .await;
                if changed {
                    self.persist_settings().await;
                }
                let verb = if enable { "enabled" } else { "disabled" };
                self.journal
                    .log(&format!("🔒 **Server type {} {}**", category.name, verb))
                    .await;
            }
            Command::SetSetting { key, value } => {
                let updated = state
                    .update_settings(|s| s.apply(key, value).cloned())
                    .await?;
                self.persist_settings().await;
                self.journal
                    .log(&format!("✅ **Updated {}:** {}", key, updated))
                    .await;
            }
        }

        Ok(())
    }

    async fn persist_settings(&self) {
        let settings = self.orchestrator.state().settings().await;
        if let Err(e) = save_settings(self.store.as_ref(), &settings).await {
            warn!(error = %e, "Failed to save settings");
            self.journal
                .log(&format!("❌ Error saving settings: {}", e))
                .await;
        }
    }

    async fn list_groups(&self) {
        let dialogs = match self.platform.dialogs().await {
            Ok(dialogs) => dialogs,
            Err(e) => {
                self.journal
                    .log(&format!("❌ Error getting groups: {}", e))
                    .await;
                return;
            }
        };

        let mut text = String::from("📋 **Available Groups:**\n\n");
        for (i, group) in dialogs
            .iter()
            .filter(|d| d.kind == DialogKind::Group)
            .take(self.groups_limit)
            .enumerate()
        {
            let members = group
                .members
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            text.push_str(&format!(
                "{}. **{}**\n   ID: `{}`\n   Members: {}\n\n",
                i + 1,
                group.title,
                group.id,
                members
            ));
        }
        text.push_str(&format!(
            "\nUse `{}set_target GROUP_ID` to set target",
            COMMAND_PREFIX
        ));
        self.journal.reply(&text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_commands() {
        assert_eq!(parse("vpn:start"), Some(Ok(Command::Start)));
        assert_eq!(parse("  vpn:stop  "), Some(Ok(Command::Stop)));
        assert_eq!(parse("vpn:toggle_files"), Some(Ok(Command::ToggleFiles)));
        assert_eq!(parse("vpn:groups"), Some(Ok(Command::Groups)));
    }

    #[test]
    fn test_parse_set_target() {
        assert_eq!(parse("vpn:set_target 123"), Some(Ok(Command::SetTarget(123))));
        assert_eq!(
            parse("vpn:set_target -100200"),
            Some(Ok(Command::SetTarget(-100200)))
        );
        assert_eq!(
            parse("vpn:set_target abc"),
            Some(Err(CommandError::InvalidTarget("abc".to_string())))
        );
        assert!(matches!(
            parse("vpn:set_target"),
            Some(Err(CommandError::MissingArgument { .. }))
        ));
    }

    #[test]
    fn test_parse_settings_lines() {
        assert_eq!(
            parse("SCAN_INTERVAL = 120"),
            Some(Ok(Command::SetSetting {
                key: "SCAN_INTERVAL".to_string(),
                value: "120".to_string(),
            }))
        );
        assert_eq!(
            parse("vpn:set ENABLED_SERVER_TYPES = vmess, vless"),
            Some(Ok(Command::SetSetting {
                key: "ENABLED_SERVER_TYPES".to_string(),
                value: "vmess, vless".to_string(),
            }))
        );
    }

    #[test]
    fn test_conversational_text_ignored() {
        assert_eq!(parse("remember x = 5 for later"), None);
        assert_eq!(parse("Total = 3"), None);
        assert_eq!(parse("SCAN_INTERVAL = 1\nSCAN_INTERVAL = 2"), None);
        assert_eq!(parse("[LOG] ✅ **Updated SCAN_INTERVAL:** 120"), None);
        assert_eq!(parse("hello"), None);
    }

    #[test]
    fn test_unknown_prefixed_command() {
        assert_eq!(
            parse("vpn:launch"),
            Some(Err(CommandError::UnknownCommand("vpn:launch".to_string())))
        );
    }

    #[test]
    fn test_settings_text_lists_every_key() {
        let text = settings_text(&Settings::default());
        for spec in SCHEMA {
            assert!(text.contains(spec.key));
        }
    }
}
