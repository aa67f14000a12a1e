//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::decode::identifiers::FallbackIdentifiers;
use crate::logs::LogLevel;

/// Watcher settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files. Logs go to stderr only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Poll cadence
    #[serde(default)]
    pub polling: PollingSettings,

    /// Identifiers used when the backend omits a required role
    #[serde(default)]
    pub fallback_identifiers: FallbackIdentifiers,
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the explorer API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:4943/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Interval while no deployment record exists yet
    #[serde(default = "default_waiting_interval")]
    pub waiting_interval_ms: u64,

    /// Interval while a deployment is in progress
    #[serde(default = "default_tracking_interval")]
    pub tracking_interval_ms: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Give up after this many consecutive transport failures
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
}

fn default_waiting_interval() -> u64 {
    200
}

fn default_tracking_interval() -> u64 {
    2000
}

fn default_fetch_timeout() -> u64 {
    10_000
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            waiting_interval_ms: default_waiting_interval(),
            tracking_interval_ms: default_tracking_interval(),
            fetch_timeout_ms: default_fetch_timeout(),
            max_consecutive_errors: None,
        }
    }
}
