//! Configuration for a publisher run.

use crate::error::OtaError;
use ota_delivery::{BrokerAddress, BrokerConfig};
use ota_manifest::DEFAULT_FETCH_TIMEOUT;
use std::time::Duration;

/// Artifact download settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Bound on the whole HTTP request, body included
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl FetchConfig {
    /// Reject settings that would fail every download.
    pub fn validate(&self) -> Result<(), OtaError> {
        if self.timeout.is_zero() {
            return Err(OtaError::InvalidConfig(
                "fetch timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Every tunable of one update run.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub fetch: FetchConfig,
    pub broker: BrokerConfig,
}

impl PublisherConfig {
    /// Defaults for everything except the broker address.
    pub fn new(address: BrokerAddress) -> Self {
        Self {
            fetch: FetchConfig::default(),
            broker: BrokerConfig::new(address),
        }
    }

    /// Set the artifact fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch.timeout = timeout;
        self
    }

    /// Replace the broker settings
    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }
}
