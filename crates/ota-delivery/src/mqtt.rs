//! MQTT 3.1.1 sessions backed by `rumqttc`.

use crate::config::BrokerConfig;
use crate::error::{DeliveryError, Operation, Result};
use crate::topic::DeliveryTopic;
use crate::transport::{Broker, BrokerSession, QoS};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    NetworkOptions, Outgoing, Packet, Transport,
};
use tokio::time;
use tracing::{debug, trace, warn};

/// Capacity of the client request channel. One publish plus a disconnect is
/// all a session ever queues.
const REQUEST_CAPACITY: usize = 10;

/// Connects to a real MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttBroker {
    config: BrokerConfig,
}

impl MqttBroker {
    /// Validate `config` and prepare a broker handle. No I/O happens here.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn options(&self) -> MqttOptions {
        let address = &self.config.address;
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            address.host.clone(),
            address.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);
        if let Some(credentials) = &self.config.credentials {
            options.set_credentials(
                credentials.username.clone(),
                credentials.password.clone().unwrap_or_default(),
            );
        }
        if address.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    fn network_options(&self) -> NetworkOptions {
        let mut network = NetworkOptions::new();
        // rumqttc takes whole seconds; the outer timeout keeps sub-second precision.
        let secs = self.config.connect_timeout.as_secs_f64().ceil().max(1.0) as u64;
        network.set_connection_timeout(secs);
        network
    }
}

#[async_trait]
impl Broker for MqttBroker {
    type Session = MqttSession;

    async fn connect(&self) -> Result<MqttSession> {
        let broker = self.config.address.to_string();
        let timeout = self.config.connect_timeout;
        debug!(%broker, client_id = %self.config.client_id, "connecting to broker");

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        eventloop.set_network_options(self.network_options());

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            return Ok(ack.session_present);
                        }
                        return Err(DeliveryError::connection(
                            &broker,
                            format!("broker refused connection: {:?}", ack.code),
                        ));
                    }
                    Ok(event) => trace!(?event, "event before CONNACK"),
                    Err(ConnectionError::NetworkTimeout) => {
                        return Err(DeliveryError::Timeout {
                            operation: Operation::Connect,
                            after: timeout,
                        })
                    }
                    Err(err) => return Err(DeliveryError::connection(&broker, err)),
                }
            }
        };

        let session_present = time::timeout(timeout, handshake)
            .await
            .map_err(|_| DeliveryError::Timeout {
                operation: Operation::Connect,
                after: timeout,
            })??;
        debug!(%broker, session_present, "broker accepted connection");

        Ok(MqttSession {
            client,
            eventloop,
            broker,
            write_timeout: self.config.write_timeout,
            disconnect_grace: self.config.disconnect_grace,
            open: true,
        })
    }
}

/// Live MQTT connection. Dropping it closes the socket; prefer
/// [`BrokerSession::disconnect`] so the broker sees a clean DISCONNECT.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    broker: String,
    write_timeout: std::time::Duration,
    disconnect_grace: std::time::Duration,
    open: bool,
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn publish(
        &mut self,
        topic: &DeliveryTopic,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        if !self.open {
            return Err(DeliveryError::connection(&self.broker, "session is closed"));
        }

        let len = payload.len();
        self.client
            .publish_bytes(topic.as_str(), qos, retain, payload)
            .await
            .map_err(|err| DeliveryError::publish(topic, err))?;

        let broker = &self.broker;
        let eventloop = &mut self.eventloop;
        let confirm = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Publish(_))) if qos == QoS::AtMostOnce => {
                        return Ok(())
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) if qos == QoS::AtLeastOnce => {
                        return Ok(())
                    }
                    Ok(Event::Incoming(Packet::PubComp(_))) if qos == QoS::ExactlyOnce => {
                        return Ok(())
                    }
                    Ok(event) => trace!(?event, "event while publishing"),
                    // Protocol-level failures are the broker refusing the packet.
                    Err(ConnectionError::MqttState(err)) => {
                        return Err(DeliveryError::publish(topic, err))
                    }
                    Err(err) => return Err(DeliveryError::connection(broker, err)),
                }
            }
        };

        time::timeout(self.write_timeout, confirm)
            .await
            .map_err(|_| DeliveryError::Timeout {
                operation: Operation::Publish,
                after: self.write_timeout,
            })??;
        debug!(%topic, len, ?qos, retain, "publish handed to broker");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if let Err(err) = self.client.disconnect().await {
            debug!(broker = %self.broker, %err, "event loop already stopped");
            return Ok(());
        }

        let eventloop = &mut self.eventloop;
        let drain = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        };
        if time::timeout(self.disconnect_grace, drain).await.is_err() {
            warn!(
                broker = %self.broker,
                grace = ?self.disconnect_grace,
                "graceful disconnect did not finish, dropping connection"
            );
        } else {
            debug!(broker = %self.broker, "disconnected");
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if self.open {
            debug!(broker = %self.broker, "session dropped without disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerAddress;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(address: &str) -> BrokerConfig {
        BrokerConfig::new(address.parse::<BrokerAddress>().unwrap())
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(MqttBroker::new(config("tcp://localhost").client_id("")).is_err());
    }

    #[test]
    fn keeps_validated_config() {
        let broker = MqttBroker::new(config("mqtts://broker.local").client_id("panel-7")).unwrap();
        assert_eq!(broker.config().client_id, "panel-7");
        assert_eq!(broker.config().address.port, 8883);
        assert!(broker.config().address.tls);
    }

    #[tokio::test]
    async fn silent_broker_times_out() {
        // Accepts TCP but never answers CONNECT.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let broker = MqttBroker::new(
            config(&format!("tcp://{addr}")).connect_timeout(Duration::from_millis(300)),
        )
        .unwrap();
        let err = broker.connect().await.err().unwrap();
        assert!(err.is_timeout(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn refused_tcp_is_a_connection_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let broker = MqttBroker::new(config(&format!("tcp://127.0.0.1:{port}"))).unwrap();
        let err = broker.connect().await.err().unwrap();
        assert!(
            matches!(err, DeliveryError::Connection { .. }),
            "unexpected error: {err}"
        );
    }
}
