//! Scanner settings and their text encoding.
//!
//! Every option is declared once in [`SCHEMA`] together with its value type
//! and default. The record body stored in saved messages is a list of
//! `KEY = value` lines; decoding is lenient line by line so that a single bad
//! value never discards the rest of the record.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub const SCAN_INTERVAL: &str = "SCAN_INTERVAL";
pub const DELAY_BETWEEN_CHANNELS: &str = "DELAY_BETWEEN_CHANNELS";
pub const DELAY_BETWEEN_MESSAGES: &str = "DELAY_BETWEEN_MESSAGES";
pub const MAX_MESSAGES_PER_SCAN: &str = "MAX_MESSAGES_PER_SCAN";
pub const ENABLED_SERVER_TYPES: &str = "ENABLED_SERVER_TYPES";
pub const ENABLED_FILE_EXTENSIONS: &str = "ENABLED_FILE_EXTENSIONS";
pub const FILE_FORWARDING_ENABLED: &str = "FILE_FORWARDING_ENABLED";

/// Lowercase tokens accepted as boolean `true`
pub const TRUE_TOKENS: [&str; 4] = ["true", "1", "yes", "on"];

/// Heading line written into the settings record (ignored when parsing)
pub const SETTINGS_HEADING: &str = "**Current VPN Scanner Settings:**";

/// Declared type of a settings key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Bool,
    List,
}

/// A typed settings value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Int(u64),
    Bool(bool),
    List(Vec<String>),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SettingValue::Int(_) => ValueKind::Int,
            SettingValue::Bool(_) => ValueKind::Bool,
            SettingValue::List(_) => ValueKind::List,
        }
    }

    /// Decode a raw textual value as the given kind
    pub fn decode(kind: ValueKind, raw: &str) -> Result<Self, SettingsError> {
        let raw = raw.trim();
        match kind {
            ValueKind::Int => raw
                .parse::<u64>()
                .map(SettingValue::Int)
                .map_err(|_| SettingsError::InvalidValue {
                    expected: "integer",
                    value: raw.to_string(),
                }),
            ValueKind::Bool => Ok(SettingValue::Bool(
                TRUE_TOKENS.contains(&raw.to_lowercase().as_str()),
            )),
            ValueKind::List => Ok(SettingValue::List(
                raw.split(',')
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(|item| item.to_string())
                    .collect(),
            )),
        }
    }

    /// Encode as it appears on the right-hand side of a record line
    pub fn encode(&self) -> String {
        match self {
            SettingValue::Int(n) => n.to_string(),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::List(items) => items.join(","),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::List(items) => write!(f, "{}", items.join(", ")),
            other => write!(f, "{}", other.encode()),
        }
    }
}

/// One row of the settings schema
pub struct SettingSpec {
    pub key: &'static str,
    pub kind: ValueKind,
    default: fn() -> SettingValue,
}

impl SettingSpec {
    pub fn default_value(&self) -> SettingValue {
        (self.default)()
    }
}

fn list(items: &[&str]) -> SettingValue {
    SettingValue::List(items.iter().map(|s| s.to_string()).collect())
}

/// Settings schema in display and record order
pub static SCHEMA: &[SettingSpec] = &[
    SettingSpec {
        key: SCAN_INTERVAL,
        kind: ValueKind::Int,
        default: || SettingValue::Int(60),
    },
    SettingSpec {
        key: DELAY_BETWEEN_CHANNELS,
        kind: ValueKind::Int,
        default: || SettingValue::Int(5),
    },
    SettingSpec {
        key: DELAY_BETWEEN_MESSAGES,
        kind: ValueKind::Int,
        default: || SettingValue::Int(1),
    },
    SettingSpec {
        key: MAX_MESSAGES_PER_SCAN,
        kind: ValueKind::Int,
        default: || SettingValue::Int(50),
    },
    SettingSpec {
        key: ENABLED_SERVER_TYPES,
        kind: ValueKind::List,
        default: || {
            list(&[
                "vmess",
                "vless",
                "shadowsocks",
                "trojan",
                "wireguard",
                "outline",
            ])
        },
    },
    SettingSpec {
        key: ENABLED_FILE_EXTENSIONS,
        kind: ValueKind::List,
        default: || list(&[".bak", ".txt", ".npvt", ".ovpn", ".ehi", ".apk", ".conf"]),
    },
    SettingSpec {
        key: FILE_FORWARDING_ENABLED,
        kind: ValueKind::Bool,
        default: || SettingValue::Bool(true),
    },
];

/// Look up a schema row by key
pub fn spec_for(key: &str) -> Option<&'static SettingSpec> {
    SCHEMA.iter().find(|spec| spec.key == key)
}

/// Errors raised when mutating settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value '{value}': expected {expected}")]
    InvalidValue {
        expected: &'static str,
        value: String,
    },

    #[error("Malformed setting line (expected KEY = VALUE): {0}")]
    Malformed(String),
}

/// Current scanner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            values: SCHEMA
                .iter()
                .map(|spec| (spec.key.to_string(), spec.default_value()))
                .collect(),
        }
    }
}

impl Settings {
    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    /// Apply a raw `value` to `key`, decoding according to the schema
    pub fn apply(&mut self, key: &str, raw: &str) -> Result<&SettingValue, SettingsError> {
        let spec = spec_for(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        let value = SettingValue::decode(spec.kind, raw)?;
        self.values.insert(key.to_string(), value);
        Ok(&self.values[key])
    }

    /// Apply a single `KEY = VALUE` line
    pub fn apply_line(&mut self, line: &str) -> Result<(String, SettingValue), SettingsError> {
        let (key, raw) = line
            .split_once('=')
            .ok_or_else(|| SettingsError::Malformed(line.to_string()))?;
        let key = key.trim();
        let value = self.apply(key, raw)?.clone();
        Ok((key.to_string(), value))
    }

    /// Overlay a record body onto these settings.
    ///
    /// Lines without `=` or starting with `**` are skipped, unknown keys are
    /// ignored and values that fail to decode keep the previous value.
    /// Returns the number of keys that were applied.
    pub fn merge_record(&mut self, body: &str) -> usize {
        let mut applied = 0;
        for line in body.lines() {
            let line = line.trim();
            if !line.contains('=') || line.starts_with("**") {
                continue;
            }
            match self.apply_line(line) {
                Ok(_) => applied += 1,
                Err(SettingsError::UnknownKey(_)) => {}
                Err(e) => tracing::debug!(line, error = %e, "Skipping settings line"),
            }
        }
        applied
    }

    /// Render the record body (without marker)
    pub fn to_record_body(&self) -> String {
        let mut body = format!("{}\n\n", SETTINGS_HEADING);
        for spec in SCHEMA {
            if let Some(value) = self.values.get(spec.key) {
                body.push_str(&format!("{} = {}\n", spec.key, value.encode()));
            }
        }
        body
    }

    fn int(&self, key: &str) -> u64 {
        match self.values.get(key) {
            Some(SettingValue::Int(n)) => *n,
            _ => match spec_for(key).map(|s| s.default_value()) {
                Some(SettingValue::Int(n)) => n,
                _ => 0,
            },
        }
    }

    fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(SettingValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn scan_interval_secs(&self) -> u64 {
        self.int(SCAN_INTERVAL)
    }

    pub fn delay_between_channels_secs(&self) -> u64 {
        self.int(DELAY_BETWEEN_CHANNELS)
    }

    pub fn delay_between_messages_secs(&self) -> u64 {
        self.int(DELAY_BETWEEN_MESSAGES)
    }

    pub fn max_messages_per_scan(&self) -> usize {
        self.int(MAX_MESSAGES_PER_SCAN) as usize
    }

    pub fn enabled_server_types(&self) -> &[String] {
        self.list(ENABLED_SERVER_TYPES)
    }

    pub fn enabled_file_extensions(&self) -> &[String] {
        self.list(ENABLED_FILE_EXTENSIONS)
    }

    pub fn file_forwarding_enabled(&self) -> bool {
        matches!(
            self.values.get(FILE_FORWARDING_ENABLED),
            Some(SettingValue::Bool(true))
        )
    }

    /// Flip file forwarding, returning the new value
    pub fn toggle_file_forwarding(&mut self) -> bool {
        let enabled = !self.file_forwarding_enabled();
        self.values.insert(
            FILE_FORWARDING_ENABLED.to_string(),
            SettingValue::Bool(enabled),
        );
        enabled
    }

    /// Add a server type if missing. Returns false if it was already enabled.
    pub fn enable_server_type(&mut self, name: &str) -> bool {
        let mut types = self.enabled_server_types().to_vec();
        if types.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            return false;
        }
        types.push(name.to_string());
        self.values
            .insert(ENABLED_SERVER_TYPES.to_string(), SettingValue::List(types));
        true
    }

    /// Remove a server type. Returns false if it was not enabled.
    pub fn disable_server_type(&mut self, name: &str) -> bool {
        let types = self.enabled_server_types().to_vec();
        let remaining: Vec<String> = types
            .iter()
            .filter(|t| !t.eq_ignore_ascii_case(name))
            .cloned()
            .collect();
        if remaining.len() == types.len() {
            return false;
        }
        self.values
            .insert(ENABLED_SERVER_TYPES.to_string(), SettingValue::List(remaining));
        true
    }
}
