use std::fmt;
use std::time::Duration;

/// Convenient result alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Broker interaction that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Publish,
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Connect => write!(f, "connect"),
            Operation::Publish => write!(f, "publish"),
            Operation::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Errors raised while delivering a manifest to a broker.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// The device name cannot be used in a topic.
    #[error("invalid device name {name:?}: {reason}")]
    InvalidDeviceName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The broker address or client settings are unusable.
    #[error("invalid broker configuration {input:?}: {reason}")]
    InvalidConfig {
        /// Rejected value.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The session could not be established or dropped mid-flight.
    #[error("connection to {broker} failed: {reason}")]
    Connection {
        /// Broker address.
        broker: String,
        /// Transport error message.
        reason: String,
    },
    /// The broker did not accept the publish.
    #[error("publish to {topic} rejected: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Broker or client message.
        reason: String,
    },
    /// A bounded broker operation did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that expired.
        operation: Operation,
        /// Configured bound.
        after: Duration,
    },
}

impl DeliveryError {
    pub(crate) fn connection(broker: impl fmt::Display, reason: impl fmt::Display) -> Self {
        DeliveryError::Connection {
            broker: broker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn publish(topic: impl fmt::Display, reason: impl fmt::Display) -> Self {
        DeliveryError::Publish {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn config(input: impl Into<String>, reason: impl Into<String>) -> Self {
        DeliveryError::InvalidConfig {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// True when a bounded operation expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Timeout { .. })
    }
}
