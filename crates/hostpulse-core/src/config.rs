use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{HostpulseError, Result};

/// Environment variable overriding the refresh interval
pub const INTERVAL_ENV: &str = "HOSTPULSE_INTERVAL_MS";

/// Shortest refresh interval accepted
pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostpulseConfig {
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
}

impl HostpulseConfig {
    /// Defaults overlaid with `HOSTPULSE_INTERVAL_MS` when it is set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(INTERVAL_ENV) {
            config.refresh.interval_ms = parse_interval(&raw)?;
        }
        Ok(config)
    }

    /// Apply a command-line interval, which wins over the environment.
    pub fn with_interval_ms(mut self, interval_ms: Option<u64>) -> Self {
        if let Some(ms) = interval_ms {
            self.refresh.interval_ms = ms;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_ms: u64,
}

impl RefreshConfig {
    /// Refresh period, clamped to [`MIN_INTERVAL_MS`].
    pub fn interval(&self) -> Duration {
        if self.interval_ms < MIN_INTERVAL_MS {
            tracing::warn!(
                requested_ms = self.interval_ms,
                min_ms = MIN_INTERVAL_MS,
                "Refresh interval below minimum, using minimum"
            );
            return Duration::from_millis(MIN_INTERVAL_MS);
        }
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Window over which CPU busy time is measured
    pub cpu_window_ms: u64,
    /// Upper bound for hostname resolution and GPU tool invocations
    pub timeout_ms: u64,
    /// Unreachable address used to discover the outbound interface
    pub fallback_target: String,
}

impl ProbeConfig {
    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            cpu_window_ms: 100,
            timeout_ms: 2000,
            fallback_target: "10.254.254.254:1".to_string(),
        }
    }
}

fn parse_interval(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| HostpulseError::Config(format!("{}={:?}: {}", INTERVAL_ENV, raw, e)))
}
