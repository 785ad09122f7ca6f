use crate::error::{DeliveryError, Result};
use std::fmt;

/// Per-device topic holding the pending update: `displays/<device>/rx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTopic {
    device: String,
    topic: String,
}

impl DeliveryTopic {
    /// Derive the update topic for `device`.
    ///
    /// The name becomes a single topic level, so separators, wildcards and NUL
    /// are refused.
    pub fn for_device(device: &str) -> Result<Self> {
        let invalid = |reason| DeliveryError::InvalidDeviceName {
            name: device.to_string(),
            reason,
        };
        if device.is_empty() {
            return Err(invalid("name is empty"));
        }
        if device.contains('/') {
            return Err(invalid("name must not contain '/'"));
        }
        if device.contains(['+', '#']) {
            return Err(invalid("name must not contain MQTT wildcards"));
        }
        if device.contains('\0') {
            return Err(invalid("name must not contain NUL"));
        }

        Ok(Self {
            device: device.to_string(),
            topic: format!("displays/{device}/rx"),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn as_str(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for DeliveryTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)
    }
}
