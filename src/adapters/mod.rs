//! Adapter interfaces for the messaging platform.
//!
//! The scanner only talks to the platform through the [`Platform`] trait:
//! listing dialogs, reading history, sending, editing, forwarding and
//! deleting messages. The account's own saved-messages chat is addressed as
//! [`Peer::SavedMessages`].

pub mod memory;
pub mod telegram;

use chrono::{DateTime, Utc};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export the concrete platforms
pub use memory::MemoryPlatform;
pub use telegram::{GatewayClient, GatewayConfig};

/// Errors surfaced by platform calls
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform API error: {0}")]
    Api(String),

    #[error("Message {message_id} not found in chat {chat}")]
    MessageNotFound { chat: String, message_id: i64 },

    #[error("Not connected to the platform")]
    Disconnected,
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Addressable chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The account's own private history
    SavedMessages,

    /// Any channel, group or user by id
    Chat(i64),
}

impl Peer {
    /// JSON form used by the gateway (`"me"` or the numeric id)
    pub fn to_json(self) -> serde_json::Value {
        match self {
            Peer::SavedMessages => serde_json::Value::from("me"),
            Peer::Chat(id) => serde_json::Value::from(id),
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::SavedMessages => write!(f, "me"),
            Peer::Chat(id) => write!(f, "{}", id),
        }
    }
}

/// The logged-in account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Kind of dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    /// Broadcast channel
    Channel,
    /// Group or supergroup
    Group,
    /// Private chat
    User,
}

/// A dialog the account participates in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    pub kind: DialogKind,
    #[serde(default)]
    pub members: Option<u64>,
}

/// Attached file metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// A message as seen by the scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<FileMeta>,
    /// Sent by this account
    #[serde(default)]
    pub outgoing: bool,
    pub date: DateTime<Utc>,
}

impl ChatMessage {
    /// Non-empty text body, if any
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Trait for messaging platform clients
#[async_trait]
pub trait Platform: Send + Sync {
    /// Human-readable platform name
    fn name(&self) -> &str;

    /// The logged-in account
    async fn me(&self) -> PlatformResult<Account>;

    /// All dialogs the account has joined
    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>>;

    /// Most recent `limit` messages of a chat, newest first
    async fn messages(&self, peer: Peer, limit: usize) -> PlatformResult<Vec<ChatMessage>>;

    /// Saved messages with an id greater than `after_id`, oldest first
    async fn saved_messages_after(&self, after_id: i64) -> PlatformResult<Vec<ChatMessage>>;

    /// Send a text message, returning its id
    async fn send_message(&self, peer: Peer, text: &str) -> PlatformResult<i64>;

    /// Replace the text of a previously sent message
    async fn edit_message(&self, peer: Peer, message_id: i64, text: &str) -> PlatformResult<()>;

    /// Forward a message (with any attachment) to another chat
    async fn forward_message(&self, to: Peer, from: Peer, message_id: i64) -> PlatformResult<()>;

    /// Delete a message
    async fn delete_message(&self, peer: Peer, message_id: i64) -> PlatformResult<()>;

    /// Create a broadcast channel, returning its id
    async fn create_channel(&self, title: &str, about: &str) -> PlatformResult<i64>;

    /// Connectivity check
    async fn is_connected(&self) -> bool;
}
