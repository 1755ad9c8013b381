//! Runtime configuration of the stock system.
//!
//! ```toml
//! buffer_size = 32
//! strategy = "optimistic"
//! lock_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 100
//! backoff_ms = 50
//! max_backoff_ms = 1000
//! jitter = true
//! ```
//!
//! Every key is optional; missing keys take the values shown above, except `strategy`
//! which defaults to `pessimistic`.

use crate::decrement::{Backoff, RetryPolicy, Strategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    /// Capacity of the store actor's request channel.
    pub buffer_size: usize,
    /// Strategy used when the caller does not pick one.
    pub strategy: Strategy,
    /// How long a pessimistic decrement waits for the row lock. `None` waits forever.
    pub lock_timeout_ms: Option<u64>,
    pub retry: RetrySettings,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            buffer_size: 32,
            strategy: Strategy::Pessimistic,
            lock_timeout_ms: Some(5000),
            retry: RetrySettings::default(),
        }
    }
}

impl StockConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry section of [`StockConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Exponential backoff with full jitter instead of a fixed delay.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            backoff_ms: 50,
            max_backoff_ms: 1000,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.backoff_ms);
        let backoff = if self.jitter {
            Backoff::Jittered {
                base,
                max: Duration::from_millis(self.max_backoff_ms.max(self.backoff_ms)),
            }
        } else {
            Backoff::Fixed(base)
        };
        RetryPolicy::new(self.max_attempts, backoff)
    }
}
