//! Collector configuration.
//!
//! Configuration is set programmatically through [`GcConfig::builder`] or
//! loaded from the environment with [`GcConfig::from_env`].
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MARKSWEEP_POLICY` | Scan policy (name, `\|`-joined names, or hex mask) | `everything` |
//! | `MARKSWEEP_THRESHOLD` | Allocations between triggered collections (0 = never) | 128 |
//! | `MARKSWEEP_LOG` | Log level (off/error/warn/info/debug/trace) | off |
//!
//! # Example
//!
//! ```rust,ignore
//! use marksweep::{GcConfig, ScanPolicy};
//!
//! let config = GcConfig::builder()
//!     .policy(ScanPolicy::ALL_MEMORY_EXCEPT_HEAPS)
//!     .threshold(256)
//!     .build()?;
//! ```

use std::env;

use thiserror::Error;

use crate::log::LogLevel;
use crate::policy::ScanPolicy;

/// Default number of allocations between triggered collections.
pub const DEFAULT_THRESHOLD: usize = 128;

/// Error produced while building or loading a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A scan policy string or bitmask was not recognised.
    #[error("unknown scan policy `{0}`")]
    UnknownPolicy(String),
    /// A threshold value could not be parsed as an unsigned integer.
    #[error("invalid collection threshold `{0}`")]
    InvalidThreshold(String),
    /// A log level string was not recognised.
    #[error("unknown log level `{0}`")]
    UnknownLogLevel(String),
}

/// Collector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Root regions scanned by each collection cycle.
    pub policy: ScanPolicy,
    /// Number of allocations between triggered collections. 0 disables
    /// automatic collection; cycles then only run when requested.
    pub threshold: usize,
    /// Diagnostic verbosity.
    pub log_level: LogLevel,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            policy: ScanPolicy::EVERYTHING,
            threshold: DEFAULT_THRESHOLD,
            log_level: LogLevel::Off,
        }
    }
}

impl GcConfig {
    /// Start building a configuration.
    pub fn builder() -> GcConfigBuilder {
        GcConfigBuilder::default()
    }

    /// Load a configuration from the environment, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Ok(s) = env::var("MARKSWEEP_POLICY") {
            builder = builder.policy_str(&s)?;
        }
        if let Ok(s) = env::var("MARKSWEEP_THRESHOLD") {
            builder = builder.threshold_str(&s)?;
        }
        if let Ok(s) = env::var("MARKSWEEP_LOG") {
            builder = builder.log_level_str(&s)?;
        }
        builder.build()
    }
}

/// Builder for [`GcConfig`].
#[derive(Debug, Clone, Default)]
pub struct GcConfigBuilder {
    policy: Option<ScanPolicy>,
    threshold: Option<usize>,
    log_level: Option<LogLevel>,
}

impl GcConfigBuilder {
    /// Set the scan policy.
    pub fn policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Parse and set the scan policy from text.
    pub fn policy_str(mut self, s: &str) -> Result<Self, ConfigError> {
        let policy =
            ScanPolicy::parse(s).ok_or_else(|| ConfigError::UnknownPolicy(s.to_string()))?;
        self.policy = Some(policy);
        Ok(self)
    }

    /// Set the collection trigger threshold. 0 disables triggering.
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Parse and set the collection trigger threshold from text.
    pub fn threshold_str(mut self, s: &str) -> Result<Self, ConfigError> {
        let threshold = s
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidThreshold(s.to_string()))?;
        self.threshold = Some(threshold);
        Ok(self)
    }

    /// Set the diagnostic verbosity.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Parse and set the diagnostic verbosity from text.
    pub fn log_level_str(mut self, s: &str) -> Result<Self, ConfigError> {
        let level =
            LogLevel::parse(s).ok_or_else(|| ConfigError::UnknownLogLevel(s.to_string()))?;
        self.log_level = Some(level);
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> Result<GcConfig, ConfigError> {
        let defaults = GcConfig::default();
        Ok(GcConfig {
            policy: self.policy.unwrap_or(defaults.policy),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        })
    }
}
