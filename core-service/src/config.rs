//! # Page API Configuration
//!
//! Everything [`PageApi::new`](crate::PageApi::new) needs, collected with a
//! fail-fast builder.
//!
//! ```
//! use bridge_loopback::pair;
//! use core_service::ApiConfig;
//! use std::sync::Arc;
//!
//! let (channel, _host, _inbound) = pair();
//! let config = ApiConfig::builder()
//!     .channel(Arc::new(channel))
//!     .host_version(4, 8, 1)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.host_version.to_string(), "4.8.1");
//! ```
//!
//! Leaving out the channel is an error rather than a silent no-op:
//!
//! ```
//! use core_service::{ApiConfig, ServiceError};
//!
//! let err = ApiConfig::builder().build().unwrap_err();
//! assert!(matches!(err, ServiceError::CapabilityMissing { .. }));
//! ```

use crate::error::{Result, ServiceError};
use crate::utils::HostVersion;
use bridge_traits::HostChannel;
use core_runtime::BrokerConfig;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiConfig {
    /// Outbound half of the host connection.
    pub channel: Arc<dyn HostChannel>,
    pub broker: BrokerConfig,
    /// Version reported by the host, used by [`PageApi::check_version`](crate::PageApi::check_version).
    pub host_version: HostVersion,
}

impl ApiConfig {
    pub fn builder() -> ApiConfigBuilder {
        ApiConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.broker.validate()?;
        if !self.channel.is_open() {
            return Err(ServiceError::InitializationFailed(
                "host channel is already closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("channel", &"<HostChannel>")
            .field("broker", &self.broker)
            .field("host_version", &self.host_version)
            .finish()
    }
}

#[derive(Default)]
pub struct ApiConfigBuilder {
    channel: Option<Arc<dyn HostChannel>>,
    broker: Option<BrokerConfig>,
    host_version: HostVersion,
}

impl ApiConfigBuilder {
    pub fn channel(mut self, channel: Arc<dyn HostChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn broker_config(mut self, config: BrokerConfig) -> Self {
        self.broker = Some(config);
        self
    }

    pub fn host_version(mut self, major: u32, minor: u32, micro: u32) -> Self {
        self.host_version = HostVersion::new(major, minor, micro);
        self
    }

    /// # Errors
    ///
    /// - [`ServiceError::CapabilityMissing`] without a host channel
    /// - [`ServiceError::InitializationFailed`] if the channel is closed
    /// - [`ServiceError::Runtime`] for an invalid broker configuration
    pub fn build(self) -> Result<ApiConfig> {
        let channel = self.channel.ok_or_else(|| ServiceError::CapabilityMissing {
            capability: "host_channel".to_string(),
            message: "A host channel is required. Use bridge-loopback for an in-process host."
                .to_string(),
        })?;

        let config = ApiConfig {
            channel,
            broker: self.broker.unwrap_or_default(),
            host_version: self.host_version,
        };
        config.validate()?;
        Ok(config)
    }
}
