//! Scan loop.
//!
//! Walks every broadcast channel, classifies recent messages, forwards what
//! it finds and sleeps between messages, channels and cycles. The loop runs
//! as its own task; stop requests are honoured at message and channel
//! boundaries and cut any pending sleep short. A platform call already in
//! flight is allowed to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{DialogKind, Peer, Platform};
use crate::domain::stats::format_duration;
use crate::domain::{ChannelDescriptor, ChannelTally, CycleTally, Settings};

use super::extensions::file_candidate;
use super::forwarder::Forwarder;
use super::journal::Journal;
use super::patterns::classify;
use super::state::{ScanState, ScannerState};

/// Fixed pauses used by the loop
#[derive(Debug, Clone, Copy)]
pub struct ScanTiming {
    /// Pause after a failed cycle
    pub error_backoff: Duration,

    /// Pause between stop and start on restart
    pub restart_pause: Duration,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_secs(30),
            restart_pause: Duration::from_secs(5),
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    StillStopping,
    NoTarget,
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleTally),
    Interrupted(CycleTally),
}

/// Scan orchestrator
pub struct Orchestrator {
    platform: Arc<dyn Platform>,
    state: Arc<ScannerState>,
    journal: Arc<Journal>,
    forwarder: Forwarder,
    timing: ScanTiming,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn Platform>,
        state: Arc<ScannerState>,
        journal: Arc<Journal>,
        timing: ScanTiming,
    ) -> Self {
        let forwarder = Forwarder::new(platform.clone(), journal.clone());
        Self {
            platform,
            state,
            journal,
            forwarder,
            timing,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<ScannerState> {
        &self.state
    }

    pub fn timing(&self) -> ScanTiming {
        self.timing
    }

    /// Start the scan loop as a background task
    pub async fn start(self: &Arc<Self>) -> StartOutcome {
        let Some(target) = self.state.target().await else {
            warn!("Start refused: no target group");
            self.journal
                .log("❌ **No target group set! Use vpn:set_target command first.**")
                .await;
            return StartOutcome::NoTarget;
        };

        match self.state.begin_run() {
            Ok(()) => {}
            Err(ScanState::StopRequested) => {
                self.journal
                    .log("⏳ **Scanner is still stopping, try again shortly**")
                    .await;
                return StartOutcome::StillStopping;
            }
            Err(_) => {
                self.journal.log("⚠️ **Scanner already running!**").await;
                return StartOutcome::AlreadyRunning;
            }
        }

        let settings = self.state.settings().await;
        info!(target_id = target, "Scanner started");
        self.journal
            .log(&format!(
                "🚀 **VPN Scanner Started**\n\n⏱️ Scan interval: {} seconds\n🎯 Target group ID: {}",
                settings.scan_interval_secs(),
                target
            ))
            .await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop().await });
        *self.task.lock().await = Some(handle);

        StartOutcome::Started
    }

    /// Request the loop to stop. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let stats = self.state.stats();
        if !self.state.request_stop() {
            self.journal.log("ℹ️ **Scanner not running**").await;
            return false;
        }

        let runtime = stats
            .runtime(Utc::now())
            .map(format_duration)
            .unwrap_or_else(|| "0:00:00".to_string());
        info!("Scanner stop requested");
        self.journal
            .log(&format!(
                "⏹️ **Scanner Stopped**\n\n⏱️ Total runtime: {}\n📊 Total scans: {}\n🔒 Total servers found: {}\n📁 Total files forwarded: {}",
                runtime, stats.total_scans, stats.servers_found, stats.files_forwarded
            ))
            .await;
        true
    }

    /// Wait for a previously started loop to exit
    pub async fn wait_stopped(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scan task ended abnormally");
                self.state.finish_run();
            }
        }
    }

    /// Stop, pause, start
    pub async fn restart(self: &Arc<Self>) -> StartOutcome {
        self.stop().await;
        tokio::time::sleep(self.timing.restart_pause).await;
        self.wait_stopped().await;
        self.start().await
    }

    /// Status text for the operator
    pub async fn status_report(&self) -> String {
        let stats = self.state.stats();
        match self.state.scan_state() {
            ScanState::Idle => {
                let target = if self.state.target().await.is_some() {
                    "Set"
                } else {
                    "Not set"
                };
                format!(
                    "⏹️ **Scanner Idle**\n\n📊 Total scans: {}\n🔒 Total servers found: {}\n📁 Total files forwarded: {}\n🎯 Target group: {}",
                    stats.total_scans, stats.servers_found, stats.files_forwarded, target
                )
            }
            state => {
                let runtime = stats
                    .runtime(Utc::now())
                    .map(format_duration)
                    .unwrap_or_default();
                let last_scan = stats
                    .last_scan
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "None".to_string());
                let heading = if state == ScanState::Running {
                    "🔄 **Scanner Running**"
                } else {
                    "⏳ **Scanner Stopping**"
                };
                format!(
                    "{}\n\n⏱️ Runtime: {}\n📊 Scans completed: {}\n🔒 Servers found: {}\n📁 Files forwarded: {}\n⏰ Last scan: {}",
                    heading,
                    runtime,
                    stats.total_scans,
                    stats.servers_found,
                    stats.files_forwarded,
                    last_scan
                )
            }
        }
    }

    async fn run_loop(self: Arc<Self>) {
        while self.state.is_running() {
            let pause = match self.run_cycle().await {
                Ok(CycleOutcome::Completed(_)) => {
                    let settings = self.state.settings().await;
                    Duration::from_secs(settings.scan_interval_secs())
                }
                Ok(CycleOutcome::Interrupted(_)) => break,
                Err(e) => {
                    error!(error = %e, "Scan cycle failed");
                    self.journal
                        .log(&format!("❌ **Critical scan error:** {:#}", e))
                        .await;
                    self.timing.error_backoff
                }
            };

            if !self.pause(pause).await {
                break;
            }
        }

        self.state.finish_run();
        info!("Scan loop exited");
    }

    /// Run one full pass over all channels
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let settings = self.state.settings().await;
        let destination = self
            .state
            .target()
            .await
            .context("No target group set")?;

        let channels = self.channels(destination).await?;
        debug!(count = channels.len(), "Channels to scan");

        let started = Instant::now();
        let mut tally = CycleTally::default();

        for channel in &channels {
            if self.state.stop_requested() {
                return Ok(CycleOutcome::Interrupted(tally));
            }

            let channel_tally = self.scan_channel(channel, &settings, destination).await;
            tally.absorb(&channel_tally);

            let delay = Duration::from_secs(settings.delay_between_channels_secs());
            if !self.pause(delay).await {
                return Ok(CycleOutcome::Interrupted(tally));
            }
        }

        let total_scans = self.state.record_cycle();
        info!(
            scan = total_scans,
            channels = tally.channels_scanned,
            servers = tally.servers_found,
            files = tally.files_forwarded,
            "Scan complete"
        );
        self.journal
            .log(&format!(
                "✅ **Scan #{} Complete**\n\n⏱️ Duration: {} seconds\n📺 Channels: {}\n🔒 Servers found: {}\n📁 Files forwarded: {}\n\n⏳ Next scan in {} seconds",
                total_scans,
                started.elapsed().as_secs(),
                tally.channels_scanned,
                tally.servers_found,
                tally.files_forwarded,
                settings.scan_interval_secs()
            ))
            .await;

        Ok(CycleOutcome::Completed(tally))
    }

    /// Broadcast channels to scan, minus the log channel and the destination
    pub async fn channels(&self, destination: i64) -> Result<Vec<ChannelDescriptor>> {
        let dialogs = self
            .platform
            .dialogs()
            .await
            .context("Failed to list channels")?;
        let log_channel = self.journal.channel().await;

        Ok(dialogs
            .into_iter()
            .filter(|d| d.kind == DialogKind::Channel)
            .filter(|d| d.id != destination && Some(d.id) != log_channel)
            .map(|d| ChannelDescriptor {
                id: d.id,
                title: d.title,
                username: d.username,
            })
            .collect())
    }

    /// Scan one channel. Never fails; errors are journaled.
    #[instrument(skip(self, settings), fields(channel = %channel.title))]
    pub async fn scan_channel(
        &self,
        channel: &ChannelDescriptor,
        settings: &Settings,
        destination: i64,
    ) -> ChannelTally {
        let mut tally = ChannelTally::default();

        let messages = match self
            .platform
            .messages(Peer::Chat(channel.id), settings.max_messages_per_scan())
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Failed to fetch messages");
                self.journal
                    .log(&format!("❌ Error scanning {}: {}", channel.title, e))
                    .await;
                return tally;
            }
        };

        let message_delay = Duration::from_secs(settings.delay_between_messages_secs());

        for message in &messages {
            if self.state.stop_requested() {
                break;
            }
            tally.messages_scanned += 1;

            if let Some(text) = message.text() {
                for found in classify(text, settings.enabled_server_types()) {
                    if self
                        .forwarder
                        .forward_match(&found, &channel.title, destination)
                        .await
                    {
                        tally.servers_found += 1;
                        self.state.record_server();
                    }
                }
            }

            if settings.file_forwarding_enabled() {
                if let Some(file) = file_candidate(message, settings.enabled_file_extensions()) {
                    if self
                        .forwarder
                        .forward_file(&file, &channel.title, destination)
                        .await
                    {
                        tally.files_forwarded += 1;
                        self.state.record_file();
                    }
                }
            }

            if !self.pause(message_delay).await {
                break;
            }
        }

        if tally.found_anything() {
            self.journal
                .log(&format!(
                    "📡 **Channel Scan Complete**\n\n📺 Channel: {}\n📊 Messages scanned: {}\n🔒 Servers found: {}\n📁 Files forwarded: {}",
                    channel.title, tally.messages_scanned, tally.servers_found, tally.files_forwarded
                ))
                .await;
        }

        tally
    }

    /// Sleep unless a stop is requested first. Returns false if stopping.
    async fn pause(&self, duration: Duration) -> bool {
        if self.state.stop_requested() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let mut stop_rx = self.state.subscribe_stop();
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.state.stop_requested(),
            _ = stop_rx.wait_for(|stopped| *stopped) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryPlatform;

    fn orchestrator(platform: Arc<MemoryPlatform>) -> Arc<Orchestrator> {
        let journal = Arc::new(Journal::new(platform.clone()));
        Arc::new(Orchestrator::new(
            platform,
            Arc::new(ScannerState::default()),
            journal,
            ScanTiming::default(),
        ))
    }

    #[tokio::test]
    async fn test_start_without_target_stays_idle() {
        let platform = Arc::new(MemoryPlatform::new());
        let orchestrator = orchestrator(platform.clone());

        assert_eq!(orchestrator.start().await, StartOutcome::NoTarget);
        assert_eq!(orchestrator.state().scan_state(), ScanState::Idle);
        assert!(platform
            .sent_to(Peer::SavedMessages)
            .iter()
            .any(|t| t.contains("No target group set")));
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let platform = Arc::new(MemoryPlatform::new());
        let orchestrator = orchestrator(platform.clone());
        assert!(!orchestrator.stop().await);
    }

    #[tokio::test]
    async fn test_channels_excludes_groups() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_channel(-1, "News");
        platform.add_group(-2, "Chat", Some(10));
        let orchestrator = orchestrator(platform);

        let channels = orchestrator.channels(-100).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].title, "News");
    }

    #[tokio::test]
    async fn test_channels_skip_log_channel_and_destination() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_channel(-1, "News");
        platform.add_channel(-3, "Forward Here");
        let orchestrator = orchestrator(platform);
        orchestrator.journal.attach_channel("VPN Scanner Logs").await;
        assert!(orchestrator.journal.channel().await.is_some());

        let channels = orchestrator.channels(-3).await.unwrap();
        let ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![-1]);
    }

    #[tokio::test]
    async fn test_idle_status_report() {
        let platform = Arc::new(MemoryPlatform::new());
        let orchestrator = orchestrator(platform);
        let report = orchestrator.status_report().await;
        assert!(report.contains("Scanner Idle"));
        assert!(report.contains("Target group: Not set"));
    }
}
