//! Cumulative scan statistics.

use chrono::{DateTime, Utc};

/// Counters kept for the lifetime of the process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStatistics {
    /// Full scan cycles completed
    pub total_scans: u64,

    /// Server configs forwarded
    pub servers_found: u64,

    /// Files forwarded
    pub files_forwarded: u64,

    /// When the last cycle completed
    pub last_scan: Option<DateTime<Utc>>,

    /// When the current run started (None while idle)
    pub started_at: Option<DateTime<Utc>>,
}

impl ScanStatistics {
    /// Elapsed time of the current run, if running
    pub fn runtime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at.map(|start| now - start)
    }
}

/// Per-channel tally for a single scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelTally {
    pub messages_scanned: u64,
    pub servers_found: u64,
    pub files_forwarded: u64,
}

impl ChannelTally {
    pub fn found_anything(&self) -> bool {
        self.servers_found > 0 || self.files_forwarded > 0
    }
}

/// Tally for one full cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTally {
    pub channels_scanned: u64,
    pub servers_found: u64,
    pub files_forwarded: u64,
}

impl CycleTally {
    pub fn absorb(&mut self, channel: &ChannelTally) {
        self.channels_scanned += 1;
        self.servers_found += channel.servers_found;
        self.files_forwarded += channel.files_forwarded;
    }
}

/// Format a duration as `H:MM:SS`
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
