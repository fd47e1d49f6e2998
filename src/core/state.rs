//! Shared scanner state.
//!
//! One `ScannerState` is shared by the command interpreter and the scan
//! loop. Settings and target are behind async locks; the run state is a
//! plain mutex so a stop can be requested from synchronous code, and every
//! stop request is also published on a `watch` channel so that sleeping
//! loops wake up immediately.

use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::{watch, RwLock};

use crate::domain::{ScanStatistics, Settings};

/// Lifecycle of the scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    StopRequested,
}

pub struct ScannerState {
    settings: RwLock<Settings>,
    target: RwLock<Option<i64>>,
    stats: Mutex<ScanStatistics>,
    run_state: Mutex<ScanState>,
    stop_tx: watch::Sender<bool>,
}

impl Default for ScannerState {
    fn default() -> Self {
        Self::new(Settings::default(), None)
    }
}

impl ScannerState {
    pub fn new(settings: Settings, target: Option<i64>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            settings: RwLock::new(settings),
            target: RwLock::new(target),
            stats: Mutex::new(ScanStatistics::default()),
            run_state: Mutex::new(ScanState::Idle),
            stop_tx,
        }
    }

    /// Snapshot of the current settings
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Mutate settings in place, returning the closure's result
    pub async fn update_settings<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Settings) -> T,
    {
        let mut settings = self.settings.write().await;
        f(&mut settings)
    }

    pub async fn replace_settings(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }

    pub async fn target(&self) -> Option<i64> {
        *self.target.read().await
    }

    pub async fn set_target(&self, target: i64) {
        *self.target.write().await = Some(target);
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> ScanStatistics {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn with_stats<T>(&self, f: impl FnOnce(&mut ScanStatistics) -> T) -> T {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats)
    }

    pub fn record_server(&self) {
        self.with_stats(|s| s.servers_found += 1);
    }

    pub fn record_file(&self) {
        self.with_stats(|s| s.files_forwarded += 1);
    }

    /// Count a completed cycle, returning the new total
    pub fn record_cycle(&self) -> u64 {
        self.with_stats(|s| {
            s.total_scans += 1;
            s.last_scan = Some(Utc::now());
            s.total_scans
        })
    }

    pub fn scan_state(&self) -> ScanState {
        *self.run_state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.scan_state() == ScanState::Running
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Idle -> Running. Returns the state found if the transition is refused.
    pub fn begin_run(&self) -> Result<(), ScanState> {
        let mut run_state = self.run_state.lock().unwrap_or_else(|e| e.into_inner());
        if *run_state != ScanState::Idle {
            return Err(*run_state);
        }
        *run_state = ScanState::Running;
        self.stop_tx.send_replace(false);
        self.with_stats(|s| s.started_at = Some(Utc::now()));
        Ok(())
    }

    /// Running -> StopRequested. Returns false if not running.
    pub fn request_stop(&self) -> bool {
        let mut run_state = self.run_state.lock().unwrap_or_else(|e| e.into_inner());
        if *run_state != ScanState::Running {
            return false;
        }
        *run_state = ScanState::StopRequested;
        self.stop_tx.send_replace(true);
        true
    }

    /// Called by the scan loop on exit: back to Idle
    pub fn finish_run(&self) {
        let mut run_state = self.run_state.lock().unwrap_or_else(|e| e.into_inner());
        *run_state = ScanState::Idle;
        self.with_stats(|s| s.started_at = None);
    }

    /// Receiver that observes stop requests
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}
