//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;
use crate::watch::controller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// DAOs to watch
    pub dao_ids: Vec<String>,

    /// Explorer API base URL
    pub backend_base_url: String,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Options shared by every watch session
    pub controller: controller::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            dao_ids: Vec::new(),
            backend_base_url: "http://localhost:4943/api/v1".to_string(),
            request_timeout: Duration::from_secs(10),
            controller: controller::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build options from the settings file and the DAOs named on the command line
    pub fn from_settings(settings: &Settings, dao_ids: Vec<String>) -> Self {
        Self {
            dao_ids,
            backend_base_url: settings.backend.base_url.clone(),
            request_timeout: Duration::from_secs(settings.backend.request_timeout_secs),
            controller: controller::Options {
                waiting_interval: Duration::from_millis(settings.polling.waiting_interval_ms),
                tracking_interval: Duration::from_millis(settings.polling.tracking_interval_ms),
                fetch_timeout: Duration::from_millis(settings.polling.fetch_timeout_ms),
                max_consecutive_errors: settings.polling.max_consecutive_errors,
                fallback_identifiers: settings.fallback_identifiers.clone(),
            },
        }
    }
}
