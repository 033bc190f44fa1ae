//! Admission control configuration.

use crate::application::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// Default maximum requests per burst window.
pub const DEFAULT_BURST_LIMIT: u32 = 20;
/// Default burst window length in seconds.
pub const DEFAULT_BURST_WINDOW_SECS: u64 = 10;
/// Default maximum in-flight requests per scope.
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 10;
/// Default idle time after which a local burst window may be swept.
pub const DEFAULT_LOCAL_ENTRY_EXPIRATION: Duration = Duration::from_secs(20 * 60);

/// Process-wide admission settings.
///
/// A limit of zero switches that check off.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdmissionConfig {
    /// Master switch; when off every request passes straight through
    pub enabled: bool,
    /// Maximum requests per scope inside one burst window
    pub burst_limit: u32,
    /// Burst window length in seconds
    pub burst_window_secs: u64,
    /// Maximum simultaneous in-flight requests per scope
    pub concurrency_limit: u32,
    /// Idle time after which a local burst window may be swept
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub local_entry_expiration: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            burst_limit: DEFAULT_BURST_LIMIT,
            burst_window_secs: DEFAULT_BURST_WINDOW_SECS,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            local_entry_expiration: DEFAULT_LOCAL_ENTRY_EXPIRATION,
        }
    }
}

impl AdmissionConfig {
    /// Environment variable for [`enabled`](Self::enabled).
    pub const ENV_ENABLED: &'static str = "RISK_CONTROL_ENABLED";
    /// Environment variable for [`burst_limit`](Self::burst_limit).
    pub const ENV_BURST_LIMIT: &'static str = "RISK_CONTROL_BURST_LIMIT";
    /// Environment variable for [`burst_window_secs`](Self::burst_window_secs).
    pub const ENV_BURST_WINDOW: &'static str = "RISK_CONTROL_BURST_WINDOW";
    /// Environment variable for [`concurrency_limit`](Self::concurrency_limit).
    pub const ENV_CONCURRENCY_LIMIT: &'static str = "RISK_CONTROL_CONCURRENCY_LIMIT";

    /// Enabled configuration with default limits.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Set the burst limit and window.
    pub fn with_burst(mut self, limit: u32, window_secs: u64) -> Self {
        self.burst_limit = limit;
        self.burst_window_secs = window_secs;
        self
    }

    /// Set the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Whether the burst check runs.
    pub fn burst_active(&self) -> bool {
        self.burst_limit > 0 && self.burst_window_secs > 0
    }

    /// Whether the concurrency check runs.
    pub fn concurrency_active(&self) -> bool {
        self.concurrency_limit > 0
    }

    /// Check that the settings are coherent.
    ///
    /// A burst limit without a window, or the other way round, only switches
    /// the burst check off and is logged.
    ///
    /// # Errors
    /// Returns `ConfigError::ExpirationShorterThanWindow` if an active burst
    /// window outlives `local_entry_expiration`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.burst_active() && (self.burst_limit > 0 || self.burst_window_secs > 0) {
            tracing::warn!(
                burst_limit = self.burst_limit,
                burst_window_secs = self.burst_window_secs,
                "burst check disabled, limit and window must both be positive"
            );
        }
        if self.burst_active() && self.local_entry_expiration.as_secs() < self.burst_window_secs {
            return Err(ConfigError::ExpirationShorterThanWindow {
                expiration_secs: self.local_entry_expiration.as_secs(),
                window_secs: self.burst_window_secs,
            });
        }
        Ok(())
    }

    /// Load settings from the process environment on top of the defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidVar` for a variable that does not parse,
    /// or any error from [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            enabled: parse_var(&lookup, Self::ENV_ENABLED, defaults.enabled)?,
            burst_limit: parse_var(&lookup, Self::ENV_BURST_LIMIT, defaults.burst_limit)?,
            burst_window_secs: parse_var(
                &lookup,
                Self::ENV_BURST_WINDOW,
                defaults.burst_window_secs,
            )?,
            concurrency_limit: parse_var(
                &lookup,
                Self::ENV_CONCURRENCY_LIMIT,
                defaults.concurrency_limit,
            )?,
            local_entry_expiration: defaults.local_entry_expiration,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}

#[cfg(feature = "serde")]
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
