//! Process runtime.
//!
//! Wires the platform, shared state, record store, journal, scan loop and
//! command interpreter together. Startup loads the persisted settings and
//! target, attaches the log channel and announces itself; after that new
//! saved messages are polled into a queue and handed to the interpreter one
//! at a time until the platform disconnects or shutdown is requested.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::{Account, ChatMessage, Peer, Platform};
use crate::config::ScannerSettings;
use crate::core::interpreter::help_text;
use crate::core::record_store::{load_settings, load_target};
use crate::core::{ChatLogStore, Interpreter, Journal, Orchestrator, RecordStore, ScannerState};

/// Capacity of the inbound command queue
const QUEUE_CAPACITY: usize = 100;

/// Why the runtime stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Shutdown signal received
    Requested,
    /// The platform connection was lost
    Disconnected,
}

pub struct Runtime {
    platform: Arc<dyn Platform>,
    state: Arc<ScannerState>,
    store: Arc<dyn RecordStore>,
    journal: Arc<Journal>,
    orchestrator: Arc<Orchestrator>,
    interpreter: Arc<Interpreter>,
    options: ScannerSettings,
}

impl Runtime {
    pub fn new(platform: Arc<dyn Platform>, options: ScannerSettings) -> Self {
        let state = Arc::new(ScannerState::default());
        let store: Arc<dyn RecordStore> = Arc::new(ChatLogStore::with_lookback(
            platform.clone(),
            options.record_lookback,
        ));
        let journal = Arc::new(Journal::new(platform.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            platform.clone(),
            state.clone(),
            journal.clone(),
            options.timing(),
        ));
        let interpreter = Arc::new(
            Interpreter::new(
                platform.clone(),
                orchestrator.clone(),
                store.clone(),
                journal.clone(),
            )
            .with_groups_limit(options.groups_limit),
        );

        Self {
            platform,
            state,
            store,
            journal,
            orchestrator,
            interpreter,
            options,
        }
    }

    pub fn state(&self) -> &Arc<ScannerState> {
        &self.state
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.interpreter
    }

    /// Connect, restore persisted state and announce startup.
    ///
    /// Only an unreachable platform is fatal; unreadable records fall back
    /// to defaults.
    pub async fn start(&self) -> Result<Account> {
        let account = self
            .platform
            .me()
            .await
            .with_context(|| format!("Failed to connect to {}", self.platform.name()))?;
        info!(account = account.id, username = ?account.username, "Connected");

        match load_settings(self.store.as_ref()).await {
            Ok(settings) => self.state.replace_settings(settings).await,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                self.journal
                    .log(&format!("❌ Error loading settings: {}", e))
                    .await;
            }
        }

        match load_target(self.store.as_ref()).await {
            Ok(Some(target)) => {
                info!(target_id = target, "Target group restored");
                self.state.set_target(target).await;
            }
            Ok(None) => debug!("No target group stored"),
            Err(e) => {
                warn!(error = %e, "Failed to load target group");
                self.journal
                    .log(&format!("❌ Error loading target group: {}", e))
                    .await;
            }
        }

        self.journal
            .attach_channel(&self.options.log_channel_title)
            .await;

        let target = match self.state.target().await {
            Some(id) => id.to_string(),
            None => "Not set".to_string(),
        };
        self.journal
            .log(&format!(
                "🤖 **VPN Scanner Bot Started**\n\n🎯 Target group: {}\n\n{}",
                target,
                help_text()
            ))
            .await;

        Ok(account)
    }

    /// Newest saved message id; commands at or below it are history
    async fn watermark(&self) -> i64 {
        match self.platform.messages(Peer::SavedMessages, 1).await {
            Ok(messages) => messages.first().map(|m| m.id).unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Failed to read saved messages watermark");
                0
            }
        }
    }

    /// Spawn the task that polls saved messages into a queue
    fn spawn_feed(
        &self,
        after_id: i64,
    ) -> (mpsc::Receiver<ChatMessage>, watch::Sender<bool>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let platform = self.platform.clone();
        let poll = self.options.command_poll();

        let handle = tokio::spawn(async move {
            run_feed(platform, after_id, poll, tx, stop_rx).await;
        });

        (rx, stop_tx, handle)
    }

    /// Handle commands until `shutdown` resolves or the platform disconnects
    pub async fn run<F>(&self, shutdown: F) -> Result<Shutdown>
    where
        F: Future<Output = ()>,
    {
        let after_id = self.watermark().await;
        let (mut queue, feed_stop, feed) = self.spawn_feed(after_id);
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                message = queue.recv() => match message {
                    Some(message) => {
                        self.interpreter.handle(&message).await;
                    }
                    None => break Shutdown::Disconnected,
                },
                _ = &mut shutdown => break Shutdown::Requested,
            }
        };

        info!(?reason, "Shutting down");
        feed_stop.send_replace(true);
        if let Err(e) = feed.await {
            error!(error = %e, "Command feed ended abnormally");
        }

        if self.state.request_stop() {
            info!("Stopping scanner");
        }
        self.orchestrator.wait_stopped().await;

        Ok(reason)
    }
}

/// Poll loop feeding new saved messages into the queue
async fn run_feed(
    platform: Arc<dyn Platform>,
    mut after_id: i64,
    poll: std::time::Duration,
    tx: mpsc::Sender<ChatMessage>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        match platform.saved_messages_after(after_id).await {
            Ok(messages) => {
                for message in messages {
                    after_id = after_id.max(message.id);
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                if !platform.is_connected().await {
                    error!(error = %e, "Platform disconnected");
                    return;
                }
                warn!(error = %e, "Failed to poll saved messages");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = stop_rx.wait_for(|stopped| *stopped) => return,
        }
    }
}
