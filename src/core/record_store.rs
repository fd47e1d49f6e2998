//! Durable records kept in the operator's saved messages.
//!
//! Each record kind is a single message whose text starts with a fixed
//! marker. [`ChatLogStore`] only looks at the most recent `lookback`
//! messages: a record older than that is treated as absent and defaults
//! apply. Saving edits the existing message in place when one is found,
//! otherwise a new message is sent.
//!
//! The lookup and the edit are two separate platform calls. Two concurrent
//! writers would race and the later edit wins, so all writes go through the
//! command interpreter, which handles one command at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapters::{Peer, Platform, PlatformResult};
use crate::domain::Settings;

/// Default number of saved messages searched for a marker
pub const DEFAULT_LOOKBACK: usize = 50;

/// Token preceding the destination id in the target record
pub const GROUP_ID_TOKEN: &str = "GROUP_ID:";

/// Kinds of durable record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Settings,
    Target,
}

impl RecordKind {
    /// Leading marker identifying the record
    pub fn marker(self) -> &'static str {
        match self {
            RecordKind::Settings => "⚙️ VPN_SCANNER_SETTINGS",
            RecordKind::Target => "🎯 VPN_TARGET_GROUP",
        }
    }
}

/// A record found in the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedRecord {
    pub message_id: i64,

    /// Text following the marker line
    pub body: String,
}

/// Key-value store of marked records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the authoritative record of a kind, if any
    async fn load(&self, kind: RecordKind) -> PlatformResult<Option<MarkedRecord>>;

    /// Write the record body, replacing any existing record
    async fn save(&self, kind: RecordKind, body: &str) -> PlatformResult<()>;
}

/// Record store backed by the saved-messages history
pub struct ChatLogStore {
    platform: Arc<dyn Platform>,
    lookback: usize,
}

impl ChatLogStore {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self::with_lookback(platform, DEFAULT_LOOKBACK)
    }

    pub fn with_lookback(platform: Arc<dyn Platform>, lookback: usize) -> Self {
        Self { platform, lookback }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Render the full message text for a record
    pub fn compose(kind: RecordKind, body: &str) -> String {
        format!("{}\n\n{}", kind.marker(), body)
    }

    /// Newest operator message in the window that starts with the marker
    async fn find(&self, kind: RecordKind) -> PlatformResult<Option<MarkedRecord>> {
        let marker = kind.marker();
        let messages = self
            .platform
            .messages(Peer::SavedMessages, self.lookback)
            .await?;

        let record = messages
            .into_iter()
            .filter(|m| m.outgoing)
            .find_map(|m| {
                let text = m.text.as_deref()?.trim_start();
                let rest = text.strip_prefix(marker)?;
                Some(MarkedRecord {
                    message_id: m.id,
                    body: rest.trim_start_matches(['\r', '\n']).to_string(),
                })
            });

        Ok(record)
    }
}

#[async_trait]
impl RecordStore for ChatLogStore {
    async fn load(&self, kind: RecordKind) -> PlatformResult<Option<MarkedRecord>> {
        let record = self.find(kind).await?;
        if record.is_none() {
            debug!(?kind, lookback = self.lookback, "No record within lookback window");
        }
        Ok(record)
    }

    async fn save(&self, kind: RecordKind, body: &str) -> PlatformResult<()> {
        let text = Self::compose(kind, body);

        match self.find(kind).await? {
            Some(existing) => {
                debug!(?kind, message_id = existing.message_id, "Editing record in place");
                self.platform
                    .edit_message(Peer::SavedMessages, existing.message_id, &text)
                    .await
            }
            None => {
                debug!(?kind, "Creating new record");
                self.platform
                    .send_message(Peer::SavedMessages, &text)
                    .await
                    .map(|_| ())
            }
        }
    }
}

/// Load settings, starting from defaults. Returns defaults if no record exists.
pub async fn load_settings(store: &dyn RecordStore) -> PlatformResult<Settings> {
    let mut settings = Settings::default();
    if let Some(record) = store.load(RecordKind::Settings).await? {
        settings.merge_record(&record.body);
    }
    Ok(settings)
}

/// Persist settings
pub async fn save_settings(store: &dyn RecordStore, settings: &Settings) -> PlatformResult<()> {
    store
        .save(RecordKind::Settings, &settings.to_record_body())
        .await
}

/// Load the destination id, if a target record exists and parses
pub async fn load_target(store: &dyn RecordStore) -> PlatformResult<Option<i64>> {
    Ok(store
        .load(RecordKind::Target)
        .await?
        .and_then(|record| parse_target(&record.body)))
}

/// Persist the destination id
pub async fn save_target(store: &dyn RecordStore, target: i64) -> PlatformResult<()> {
    store.save(RecordKind::Target, &target_body(target)).await
}

/// Extract the destination id from a target record body
pub fn parse_target(body: &str) -> Option<i64> {
    body.lines().find_map(|line| {
        let (_, rest) = line.split_once(GROUP_ID_TOKEN)?;
        rest.trim().parse::<i64>().ok()
    })
}

/// Render a target record body
pub fn target_body(target: i64) -> String {
    format!("{} {}", GROUP_ID_TOKEN, target)
}
