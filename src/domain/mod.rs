//! Domain types for the scanner.
//!
//! This module contains the core data structures:
//! - Settings: typed options and their record encoding
//! - Stats: cumulative and per-scan counters
//! - Content: channels, pattern matches, file candidates

pub mod content;
pub mod settings;
pub mod stats;

// Re-export commonly used types
pub use content::{ChannelDescriptor, FileCandidate, PatternMatch};
pub use settings::{SettingValue, Settings, SettingsError, ValueKind};
pub use stats::{ChannelTally, CycleTally, ScanStatistics};
