//! Chaos and artificial delay configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DelayConfig {
    /// Fixed delay added to every mock response
    #[serde(default)]
    pub fixed_ms: u64,
    /// Uniform random delay `[min, max]`; takes precedence over `fixed_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_range_ms: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChaosConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Probability in [0, 1] that a request fails before matching
    #[serde(default)]
    pub failure_rate: f64,
    #[serde(default = "default_error_status")]
    pub error_status: u16,
}

fn default_error_status() -> u16 {
    500
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_rate: 0.0,
            error_status: default_error_status(),
        }
    }
}
