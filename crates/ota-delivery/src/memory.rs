//! In-process broker with MQTT retained-message semantics.
//!
//! Used by tests. A retained publish replaces whatever the topic
//! held before and an empty retained payload clears it, so a subscriber
//! arriving later sees at most the latest message.

use crate::error::{DeliveryError, Operation, Result};
use crate::topic::DeliveryTopic;
use crate::transport::{Broker, BrokerSession, QoS};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const MEMORY_BROKER: &str = "memory://broker";

#[derive(Debug, Default)]
struct State {
    retained: HashMap<String, Bytes>,
    open_sessions: usize,
    connects: usize,
    disconnects: usize,
    publishes: usize,
    refuse_connections: bool,
    reject_publishes: bool,
    stalled_publishes: Option<Duration>,
}

/// Shared handle to an in-memory broker. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// What a new subscriber to `topic` would receive.
    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.lock().retained.get(topic).cloned()
    }

    /// Number of topics currently holding a retained message.
    pub fn retained_count(&self) -> usize {
        self.lock().retained.len()
    }

    /// Sessions connected but not yet disconnected or dropped.
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Successful connects so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Explicit disconnects so far.
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    /// Accepted publishes so far.
    pub fn publishes(&self) -> usize {
        self.lock().publishes
    }

    /// Make subsequent connects fail with a connection error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Make subsequent publishes fail with a publish error.
    pub fn reject_publishes(&self, reject: bool) {
        self.lock().reject_publishes = reject;
    }

    /// Make subsequent publishes hang for `write_timeout` and then fail with
    /// a publish timeout, as a session bounded by that write timeout would.
    pub fn stall_publishes(&self, write_timeout: Option<Duration>) {
        self.lock().stalled_publishes = write_timeout;
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(DeliveryError::connection(
                MEMORY_BROKER,
                "connection refused",
            ));
        }
        state.connects += 1;
        state.open_sessions += 1;
        Ok(MemorySession {
            broker: self.clone(),
            open: true,
        })
    }
}

/// Session on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemorySession {
    broker: MemoryBroker,
    open: bool,
}

impl MemorySession {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.broker.lock().open_sessions -= 1;
        }
    }
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn publish(
        &mut self,
        topic: &DeliveryTopic,
        payload: Bytes,
        _qos: QoS,
        retain: bool,
    ) -> Result<()> {
        if !self.open {
            return Err(DeliveryError::connection(MEMORY_BROKER, "session is closed"));
        }
        let stall = {
            let state = self.broker.lock();
            if state.reject_publishes {
                return Err(DeliveryError::publish(topic, "not authorized"));
            }
            state.stalled_publishes
        };
        if let Some(after) = stall {
            tokio::time::sleep(after).await;
            return Err(DeliveryError::Timeout {
                operation: Operation::Publish,
                after,
            });
        }

        let mut state = self.broker.lock();
        state.publishes += 1;
        if retain {
            if payload.is_empty() {
                state.retained.remove(topic.as_str());
            } else {
                state.retained.insert(topic.as_str().to_string(), payload);
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.open {
            self.broker.lock().disconnects += 1;
            self.close();
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(device: &str) -> DeliveryTopic {
        DeliveryTopic::for_device(device).unwrap()
    }

    #[tokio::test]
    async fn retained_publish_replaces_previous() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect().await.unwrap();
        let kitchen = topic("kitchen-display");

        session
            .publish(&kitchen, Bytes::from_static(b"first"), QoS::AtMostOnce, true)
            .await
            .unwrap();
        session
            .publish(&kitchen, Bytes::from_static(b"second"), QoS::AtMostOnce, true)
            .await
            .unwrap();
        session.disconnect().await.unwrap();

        assert_eq!(
            broker.retained(kitchen.as_str()),
            Some(Bytes::from_static(b"second"))
        );
        assert_eq!(broker.retained_count(), 1);
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn empty_retained_payload_clears_topic() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect().await.unwrap();
        let hall = topic("hall");

        session
            .publish(&hall, Bytes::from_static(b"update"), QoS::AtMostOnce, true)
            .await
            .unwrap();
        session
            .publish(&hall, Bytes::new(), QoS::AtMostOnce, true)
            .await
            .unwrap();

        assert!(broker.retained(hall.as_str()).is_none());
    }

    #[tokio::test]
    async fn non_retained_publish_is_not_stored() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect().await.unwrap();
        session
            .publish(&topic("hall"), Bytes::from_static(b"x"), QoS::AtMostOnce, false)
            .await
            .unwrap();
        assert_eq!(broker.retained_count(), 0);
        assert_eq!(broker.publishes(), 1);
    }

    #[tokio::test]
    async fn dropped_session_is_released() {
        let broker = MemoryBroker::new();
        {
            let _session = broker.connect().await.unwrap();
            assert_eq!(broker.open_sessions(), 1);
        }
        assert_eq!(broker.open_sessions(), 0);
        assert_eq!(broker.disconnects(), 0);
    }

    #[tokio::test]
    async fn fault_injection() {
        let broker = MemoryBroker::new();
        broker.refuse_connections(true);
        assert!(matches!(
            broker.connect().await,
            Err(DeliveryError::Connection { .. })
        ));

        broker.refuse_connections(false);
        broker.reject_publishes(true);
        let mut session = broker.connect().await.unwrap();
        let err = session
            .publish(&topic("hall"), Bytes::from_static(b"x"), QoS::AtMostOnce, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Publish { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_times_out() {
        let broker = MemoryBroker::new();
        broker.stall_publishes(Some(Duration::from_secs(10)));
        let mut session = broker.connect().await.unwrap();

        let err = session
            .publish(&topic("hall"), Bytes::from_static(b"x"), QoS::AtMostOnce, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Timeout {
                operation: Operation::Publish,
                ..
            }
        ));
        assert!(err.is_timeout());
        assert_eq!(broker.publishes(), 0);
        assert_eq!(broker.retained_count(), 0);
    }
}
