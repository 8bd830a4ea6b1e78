//! Request recording and diff tracking configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Maximum recordings retained (0 = unlimited)
    #[serde(default = "default_recording_limit")]
    pub limit: usize,
}

fn default_recording_limit() -> usize {
    1000
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_recording_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiffConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Matches scoring below this are diffed too
    #[serde(default = "default_diff_threshold")]
    pub threshold: f64,
    /// Maximum diffs retained (0 = unlimited)
    #[serde(default = "default_diff_limit")]
    pub limit: usize,
}

fn default_diff_threshold() -> f64 {
    0.8
}

fn default_diff_limit() -> usize {
    100
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_diff_threshold(),
            limit: default_diff_limit(),
        }
    }
}
