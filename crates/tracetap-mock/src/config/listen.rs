//! Listener, admin API and fallback configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub admin_enabled: bool,
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    /// Log match details at info level
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Concurrency cap for replaying recorded requests
    #[serde(default = "default_replay_max_workers")]
    pub replay_max_workers: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_admin_prefix() -> String {
    "/__admin__".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_replay_max_workers() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_enabled: true,
            admin_prefix: default_admin_prefix(),
            verbose: false,
            log_level: default_log_level(),
            replay_max_workers: default_replay_max_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    /// Status returned when no capture matches
    #[serde(default = "default_fallback_status")]
    pub status: u16,
}

fn default_fallback_status() -> u16 {
    404
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            status: default_fallback_status(),
        }
    }
}
