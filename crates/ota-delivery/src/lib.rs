//! # Update delivery
//!
//! Publishes update manifests to `displays/<device>/rx` as retained QoS 0
//! messages. The broker keeps only the latest retained message per topic, so a
//! display waking from deep sleep receives the newest pending update and
//! nothing older.

mod channel;
pub mod config;
mod error;
mod memory;
mod mqtt;
mod topic;
mod transport;

pub use channel::{DeliveryChannel, DeliveryReceipt};
pub use config::{BrokerAddress, BrokerConfig, Credentials};
pub use error::{DeliveryError, Operation, Result};
pub use memory::{MemoryBroker, MemorySession};
pub use mqtt::{MqttBroker, MqttSession};
pub use topic::DeliveryTopic;
pub use transport::{Broker, BrokerSession, QoS};
