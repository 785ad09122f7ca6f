use crate::error::Result;
use crate::topic::DeliveryTopic;
use crate::transport::{Broker, BrokerSession, QoS};
use bytes::Bytes;
use tracing::{info, warn};

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Topic the message was retained on.
    pub topic: String,
    /// Payload size in bytes; zero for a clear.
    pub len: usize,
}

/// Delivers update notifications as retained QoS 0 messages.
///
/// Each topic holds at most one pending update: a new delivery replaces the
/// retained message, it never queues behind it.
pub struct DeliveryChannel<B> {
    broker: B,
}

impl<B: Broker> DeliveryChannel<B> {
    pub fn new(broker: B) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Open a session, publish `payload` retained on `topic`, and close the
    /// session whatever the publish outcome.
    pub async fn deliver(&self, topic: &DeliveryTopic, payload: Bytes) -> Result<DeliveryReceipt> {
        let mut session = self.broker.connect().await?;
        self.publish_retained(&mut session, topic, payload).await
    }

    /// Remove the pending update for `topic` by publishing an empty retained
    /// message.
    pub async fn clear(&self, topic: &DeliveryTopic) -> Result<DeliveryReceipt> {
        self.deliver(topic, Bytes::new()).await
    }

    /// Publish on an already open session, then disconnect it. The publish
    /// error wins over a disconnect error.
    pub async fn publish_retained(
        &self,
        session: &mut B::Session,
        topic: &DeliveryTopic,
        payload: Bytes,
    ) -> Result<DeliveryReceipt> {
        let len = payload.len();
        let published = session.publish(topic, payload, QoS::AtMostOnce, true).await;
        let closed = session.disconnect().await;

        published?;
        if let Err(err) = closed {
            warn!(%topic, %err, "disconnect after publish failed");
        }
        info!(%topic, len, "retained message published");
        Ok(DeliveryReceipt {
            topic: topic.to_string(),
            len,
        })
    }
}
