//! vpnscan - channel scanner for proxy and VPN configs
//!
//! Scans every broadcast channel the account has joined, recognises proxy
//! share links and config blocks in message text, and forwards them (plus
//! config files by extension) to one destination chat.
//!
//! # Architecture
//!
//! The account's saved messages double as the control surface:
//! - Operator commands (`vpn:start`, `SCAN_INTERVAL = 120`, ...) are read
//!   from saved messages and deleted once handled
//! - Settings and the destination are persisted as marked records there
//! - Every log entry is copied there with a `[LOG]` prefix
//!
//! # Modules
//!
//! - `adapters`: Platform trait, HTTP gateway client, in-memory platform
//! - `core`: Classifier, record store, journal, scan loop, interpreter
//! - `domain`: Settings schema, statistics, content types
//! - `runtime`: Startup and the command queue
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Connect and wait for commands
//! VPNSCAN_TOKEN=... vpnscan run
//!
//! # Try the classifier offline
//! echo "vmess://eyJhZGQiOiJ4In0=" | vpnscan classify
//!
//! # Check a file name
//! vpnscan match-file profile.ovpn
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod runtime;

// Re-export main types at crate root for convenience
pub use adapters::{GatewayClient, GatewayConfig, MemoryPlatform, Platform};
pub use core::{Interpreter, Orchestrator, ScannerState};
pub use domain::{PatternMatch, Settings};
pub use runtime::Runtime;
