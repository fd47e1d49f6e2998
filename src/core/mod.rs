//! Core scanner logic.
//!
//! This module contains:
//! - Patterns: the server-config pattern library and classifier
//! - Extensions: file-extension matching
//! - RecordStore: marked records kept in saved messages
//! - Journal: the human-readable log side channel
//! - Orchestrator: the scan loop
//! - Interpreter: operator commands

pub mod extensions;
pub mod forwarder;
pub mod interpreter;
pub mod journal;
pub mod orchestrator;
pub mod patterns;
pub mod record_store;
pub mod state;

// Re-export commonly used types
pub use extensions::{file_candidate, match_extension};
pub use forwarder::Forwarder;
pub use interpreter::{Command, CommandError, Handled, Interpreter};
pub use journal::Journal;
pub use orchestrator::{CycleOutcome, Orchestrator, ScanTiming, StartOutcome};
pub use patterns::classify;
pub use record_store::{ChatLogStore, MarkedRecord, RecordKind, RecordStore};
pub use state::{ScanState, ScannerState};
