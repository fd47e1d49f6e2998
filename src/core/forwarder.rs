//! Delivery of matches and files to the destination chat.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::adapters::{Peer, Platform};
use crate::domain::{FileCandidate, PatternMatch};

use super::journal::Journal;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub struct Forwarder {
    platform: Arc<dyn Platform>,
    journal: Arc<Journal>,
}

impl Forwarder {
    pub fn new(platform: Arc<dyn Platform>, journal: Arc<Journal>) -> Self {
        Self { platform, journal }
    }

    /// Send a server config to the destination. Returns false on failure.
    pub async fn forward_match(&self, found: &PatternMatch, source: &str, destination: i64) -> bool {
        let caption = match_caption(found, source, Utc::now());

        match self
            .platform
            .send_message(Peer::Chat(destination), &caption)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(category = %found.category, %source, error = %e, "Forwarding config failed");
                self.journal
                    .log(&format!("❌ Error forwarding content: {}", e))
                    .await;
                false
            }
        }
    }

    /// Forward the original file message, then a caption. Returns false on failure.
    pub async fn forward_file(&self, file: &FileCandidate, source: &str, destination: i64) -> bool {
        let result = async {
            self.platform
                .forward_message(
                    Peer::Chat(destination),
                    Peer::Chat(file.chat_id),
                    file.message_id,
                )
                .await?;
            self.platform
                .send_message(
                    Peer::Chat(destination),
                    &file_caption(file, source, Utc::now()),
                )
                .await
        }
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(filename = %file.filename, %source, error = %e, "Forwarding file failed");
                self.journal
                    .log(&format!("❌ Error forwarding content: {}", e))
                    .await;
                false
            }
        }
    }
}

/// Message body announcing a server config
pub fn match_caption(found: &PatternMatch, source: &str, at: DateTime<Utc>) -> String {
    format!(
        "🔒 **{} Server**\n\n📡 Source: {}\n⏰ Found: {}\n\n```\n{}\n```",
        found.category.to_uppercase(),
        source,
        at.format(TIME_FORMAT),
        found.config
    )
}

/// Caption sent after a forwarded file
pub fn file_caption(file: &FileCandidate, source: &str, at: DateTime<Utc>) -> String {
    format!(
        "📁 **VPN Config File**\n\n📄 Filename: `{}`\n📊 Size: {} bytes\n📡 Source: {}\n⏰ Found: {}",
        file.filename,
        file.size,
        source,
        at.format(TIME_FORMAT)
    )
}
