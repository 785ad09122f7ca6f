use crate::error::Result;
use crate::topic::DeliveryTopic;
use async_trait::async_trait;
use bytes::Bytes;

pub use rumqttc::QoS;

/// Something that can open a publishing session.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Live session type.
    type Session: BrokerSession;

    /// Establish a session, failing with a connection or timeout error.
    async fn connect(&self) -> Result<Self::Session>;
}

/// An open session held exclusively by one delivery.
#[async_trait]
pub trait BrokerSession: Send {
    /// Hand `payload` to the broker. Returns once the broker accepted it at the
    /// given QoS; for QoS 0 that means it was written to the connection.
    async fn publish(
        &mut self,
        topic: &DeliveryTopic,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<()>;

    /// Close the session. Safe to call more than once.
    async fn disconnect(&mut self) -> Result<()>;
}
