//! Configuration types for the TraceTap mock server.

mod ai;
mod chaos;
mod listen;
mod matching;
mod recording;
mod response;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export all types for library consumers
#[allow(unused_imports)]
pub use ai::AiConfig;
pub use chaos::{ChaosConfig, DelayConfig};
#[allow(unused_imports)]
pub use listen::{FallbackConfig, ServerConfig};
pub use matching::{MatchingConfig, MatchingStrategy};
pub use recording::{DiffConfig, RecordingConfig};
pub use response::{ResponseConfig, ResponseMode, TransformerName};

/// Invalid or unreadable configuration. Raised at construction time, never
/// deferred to the first request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_score must be within [0, 1], got {0}")]
    InvalidMinScore(f64),

    #[error("weight '{name}' must be a finite, non-negative number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("score weights must not all be zero")]
    WeightsSum,

    #[error("cache_max_size must be at least 1 when caching is enabled")]
    InvalidCacheSize,

    #[error("chaos failure_rate must be within [0, 1], got {0}")]
    InvalidChaosRate(f64),

    #[error("random delay range is inverted: min {min}ms > max {max}ms")]
    InvalidDelayRange { min: u64, max: u64 },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MockConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub chaos: ChaosConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl MockConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: MockConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_min_score(self.matching.min_score)?;
        self.matching.weights.validate()?;

        if self.matching.cache_enabled && self.matching.cache_max_size == 0 {
            return Err(ConfigError::InvalidCacheSize);
        }

        validate_chaos_rate(self.chaos.failure_rate)?;

        if let Some((min, max)) = self.delay.random_range_ms {
            if min > max {
                return Err(ConfigError::InvalidDelayRange { min, max });
            }
        }

        Ok(())
    }
}

pub(crate) fn validate_min_score(min_score: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&min_score) {
        return Err(ConfigError::InvalidMinScore(min_score));
    }
    Ok(())
}

pub(crate) fn validate_chaos_rate(rate: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidChaosRate(rate));
    }
    Ok(())
}
