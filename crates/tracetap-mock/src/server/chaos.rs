//! Chaos failures and artificial delays.
//!
//! Both are decided per request before matching. Settings can be changed at
//! runtime through the admin API.

use crate::config::{validate_chaos_rate, ChaosConfig, ConfigError, DelayConfig};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

pub const CHAOS_ERROR_BODY: &str = r#"{"error":"Chaos engineering failure"}"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultSettings {
    pub delay_ms: u64,
    pub random_delay_ms: Option<(u64, u64)>,
    pub chaos_enabled: bool,
    pub chaos_rate: f64,
    pub chaos_error_status: u16,
}

impl FaultSettings {
    pub fn from_config(delay: &DelayConfig, chaos: &ChaosConfig) -> Self {
        Self {
            delay_ms: delay.fixed_ms,
            random_delay_ms: delay.random_range_ms,
            chaos_enabled: chaos.enabled,
            chaos_rate: chaos.failure_rate,
            chaos_error_status: chaos.error_status,
        }
    }

    /// Whether this request should fail before matching.
    pub fn should_fail(&self) -> bool {
        self.chaos_enabled && should_inject(self.chaos_rate, &mut rand::thread_rng())
    }

    /// Delay for this request; a random range wins over the fixed delay.
    pub fn delay(&self) -> Option<Duration> {
        let ms = match self.random_delay_ms {
            Some((min, max)) if min <= max => rand::thread_rng().gen_range(min..=max),
            _ => self.delay_ms,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn set_chaos_rate(&mut self, rate: f64) -> Result<(), ConfigError> {
        validate_chaos_rate(rate)?;
        self.chaos_rate = rate;
        Ok(())
    }
}

fn should_inject(probability: f64, rng: &mut impl Rng) -> bool {
    rng.gen::<f64>() < probability
}

pub async fn apply_delay(delay: Duration) {
    tokio::time::sleep(delay).await;
}
