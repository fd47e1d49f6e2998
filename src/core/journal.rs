//! Human-readable log side channel.
//!
//! Entries go to the log channel (once known) and are copied into saved
//! messages with a `[LOG] ` prefix. A failed send is reported locally through
//! `tracing` and never returned to the caller.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::adapters::{DialogKind, Peer, Platform};

/// Prefix for entries copied into saved messages
pub const LOG_PREFIX: &str = "[LOG] ";

/// Log channel title
pub const DEFAULT_LOG_CHANNEL_TITLE: &str = "VPN Scanner Logs";

pub struct Journal {
    platform: Arc<dyn Platform>,
    channel: RwLock<Option<i64>>,
}

impl Journal {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            channel: RwLock::new(None),
        }
    }

    /// Current log channel id
    pub async fn channel(&self) -> Option<i64> {
        *self.channel.read().await
    }

    pub async fn set_channel(&self, channel_id: i64) {
        *self.channel.write().await = Some(channel_id);
    }

    /// Find the log channel by title, creating it if missing
    pub async fn attach_channel(&self, title: &str) {
        let existing = match self.platform.dialogs().await {
            Ok(dialogs) => dialogs
                .into_iter()
                .find(|d| d.title == title && d.kind == DialogKind::Channel)
                .map(|d| d.id),
            Err(e) => {
                error!(error = %e, "Failed to list dialogs for log channel");
                None
            }
        };

        if let Some(id) = existing {
            self.set_channel(id).await;
            return;
        }

        match self
            .platform
            .create_channel(title, "Automated logs for VPN Scanner")
            .await
        {
            Ok(id) => {
                self.set_channel(id).await;
                self.log("📋 **Log Channel Created Successfully**").await;
            }
            Err(e) => error!(error = %e, "Failed to create log channel"),
        }
    }

    /// Record an entry. Never fails.
    pub async fn log(&self, text: &str) {
        info!(target: "journal", "{}", text.replace('\n', " | "));

        if let Some(channel) = self.channel().await {
            if let Err(e) = self.platform.send_message(Peer::Chat(channel), text).await {
                error!(error = %e, "Failed to send log entry to log channel");
            }
        }

        let copy = format!("{}{}", LOG_PREFIX, text);
        if let Err(e) = self.platform.send_message(Peer::SavedMessages, &copy).await {
            error!(error = %e, "Failed to copy log entry to saved messages");
        }
    }

    /// Reply in saved messages without the log prefix or log channel copy
    pub async fn reply(&self, text: &str) {
        if let Err(e) = self.platform.send_message(Peer::SavedMessages, text).await {
            error!(error = %e, "Failed to send reply");
        }
    }
}
