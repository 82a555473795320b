//! # Broker Configuration
//!
//! Settings for the [`Broker`](crate::broker::Broker), built with a fail-fast
//! builder in the same way as the rest of the workspace's configuration.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::BrokerConfig;
//! use std::time::Duration;
//!
//! let config = BrokerConfig::builder()
//!     .blocking_timeout(Duration::from_secs(5))
//!     .build()
//!     .expect("valid broker config");
//!
//! assert_eq!(config.blocking_timeout, Some(Duration::from_secs(5)));
//! ```
//!
//! ## Error Handling
//!
//! Invalid values are rejected by [`BrokerConfigBuilder::build`] with
//! [`Error::Config`]:
//!
//! ```
//! use core_runtime::config::BrokerConfig;
//!
//! let err = BrokerConfig::builder().correlation_limit(1).build();
//! assert!(err.is_err());
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

/// Largest correlation id the host protocol accepts (a signed 32-bit integer).
pub const DEFAULT_CORRELATION_LIMIT: u32 = i32::MAX as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Largest correlation id handed out before the counter wraps back to 1.
    pub correlation_limit: u32,

    /// Upper bound on how long a blocking call waits for its reply.
    ///
    /// `None` waits until the reply arrives or the broker is torn down.
    pub blocking_timeout: Option<Duration>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            correlation_limit: DEFAULT_CORRELATION_LIMIT,
            blocking_timeout: None,
        }
    }
}

impl BrokerConfig {
    pub fn builder() -> BrokerConfigBuilder {
        BrokerConfigBuilder::default()
    }

    /// Checks:
    /// - the correlation limit leaves room for at least two in-flight calls
    /// - a blocking timeout, when given, is not zero
    pub fn validate(&self) -> Result<()> {
        if self.correlation_limit < 2 {
            return Err(Error::Config(format!(
                "Correlation limit must be at least 2, got {}",
                self.correlation_limit
            )));
        }

        if self.blocking_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Blocking timeout cannot be zero. Omit it to wait for teardown instead."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BrokerConfigBuilder {
    correlation_limit: Option<u32>,
    blocking_timeout: Option<Duration>,
}

impl BrokerConfigBuilder {
    /// Sets the largest correlation id before wrapping.
    ///
    /// Default: `i32::MAX`.
    pub fn correlation_limit(mut self, limit: u32) -> Self {
        self.correlation_limit = Some(limit);
        self
    }

    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<BrokerConfig> {
        let config = BrokerConfig {
            correlation_limit: self
                .correlation_limit
                .unwrap_or(DEFAULT_CORRELATION_LIMIT),
            blocking_timeout: self.blocking_timeout,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::builder().build().unwrap();
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.correlation_limit, 2_147_483_647);
        assert!(config.blocking_timeout.is_none());
    }

    #[test]
    fn test_rejects_tiny_limit() {
        let err = BrokerConfig::builder()
            .correlation_limit(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("at least 2")));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = BrokerConfig::builder()
            .blocking_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_custom_values() {
        let config = BrokerConfig::builder()
            .correlation_limit(8)
            .blocking_timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(config.correlation_limit, 8);
        assert_eq!(config.blocking_timeout, Some(Duration::from_millis(250)));
    }
}
