//! Transient scan results: channels, matches and file candidates.

/// A channel selected for scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
}

/// A server config found in message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Category name, e.g. `vmess`
    pub category: String,

    /// Matched text, trimmed
    pub config: String,
}

impl PatternMatch {
    pub fn new(category: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            config: config.into(),
        }
    }
}

/// A file attachment whose name matched an enabled extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub filename: String,
    pub extension: String,
    pub size: u64,

    /// Chat holding the original message
    pub chat_id: i64,

    /// Original message id, forwarded as-is
    pub message_id: i64,
}
