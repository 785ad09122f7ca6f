//! Broker connection settings.

use crate::error::{DeliveryError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default client identifier, matching the name the displays expect in logs.
pub const DEFAULT_CLIENT_ID: &str = "e-paper-cli";
/// Default bound on establishing the session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default bound on writing the publish.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default MQTT keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Default time allowed for a graceful disconnect.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_millis(250);

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

/// Where the broker lives, e.g. `tcp://192.168.1.100:1883`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl FromStr for BrokerAddress {
    type Err = DeliveryError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (tls, rest) = match trimmed.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => (false, rest),
            Some(("ssl" | "tls" | "mqtts", rest)) => (true, rest),
            Some((scheme, _)) => {
                return Err(DeliveryError::config(
                    input,
                    format!("unsupported scheme {scheme}"),
                ))
            }
            None => (false, trimmed),
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(DeliveryError::config(input, "missing host"));
        }

        let default_port = if tls { MQTTS_PORT } else { MQTT_PORT };
        let (host, port) = split_host_port(rest)
            .map_err(|reason| DeliveryError::config(input, reason))?;
        if host.is_empty() {
            return Err(DeliveryError::config(input, "missing host"));
        }

        Ok(Self {
            host: host.to_string(),
            port: port.unwrap_or(default_port),
            tls,
        })
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host_port(authority: &str) -> std::result::Result<(&str, Option<u16>), String> {
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 literal".to_string())?;
        match tail {
            "" => (host, None),
            tail => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(format!("unexpected text after host: {tail}")),
            },
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = port
        .map(|port| {
            port.parse::<u16>()
                .map_err(|_| format!("invalid port {port:?}"))
        })
        .transpose()?;
    Ok((host, port))
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        if self.host.contains(':') {
            write!(f, "{scheme}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Username and optional password for the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for a publishing session.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker to connect to
    pub address: BrokerAddress,
    /// MQTT client identifier
    pub client_id: String,
    /// Optional broker login
    pub credentials: Option<Credentials>,
    /// Keep-alive interval advertised in CONNECT
    pub keep_alive: Duration,
    /// Bound on TCP connect plus CONNACK
    pub connect_timeout: Duration,
    /// Bound on handing the publish to the broker
    pub write_timeout: Duration,
    /// Time allowed for DISCONNECT to be flushed before the socket is dropped
    pub disconnect_grace: Duration,
}

impl BrokerConfig {
    /// Create a config for `address` with every tunable at its default.
    pub fn new(address: BrokerAddress) -> Self {
        Self {
            address,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            credentials: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
        }
    }

    /// Set the client identifier
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set broker credentials. A password without a username is sent with an
    /// empty username.
    pub fn credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.credentials = match (username, password) {
            (None, None) => None,
            (username, password) => Some(Credentials {
                username: username.unwrap_or_default(),
                password,
            }),
        };
        self
    }

    /// Set the keep-alive interval
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the disconnect grace period
    pub fn disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    /// Reject settings the MQTT client cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_id.starts_with(' ') {
            return Err(DeliveryError::config(
                self.client_id.clone(),
                "client id must be non-empty and must not start with a space",
            ));
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(DeliveryError::config(
                format!("{:?}", self.keep_alive),
                "keep-alive must be zero or at least one second",
            ));
        }
        for (name, value) in [
            ("connect timeout", self.connect_timeout),
            ("write timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(DeliveryError::config(
                    format!("{value:?}"),
                    format!("{name} must be greater than zero"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> BrokerAddress {
        input.parse().unwrap()
    }

    #[test]
    fn parses_broker_addresses() {
        assert_eq!(
            parse("tcp://192.168.1.100:1883"),
            BrokerAddress {
                host: "192.168.1.100".into(),
                port: 1883,
                tls: false
            }
        );
        assert_eq!(parse("mqtt://broker.local").port, 1883);
        assert_eq!(parse("broker.local:1884").port, 1884);
        assert_eq!(parse("broker.local").host, "broker.local");

        let secure = parse("ssl://broker.example.com");
        assert!(secure.tls);
        assert_eq!(secure.port, 8883);
        assert!(parse("mqtts://broker.example.com:9999").tls);

        let v6 = parse("tcp://[::1]:1883");
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.to_string(), "tcp://[::1]:1883");
    }

    #[test]
    fn rejects_bad_addresses() {
        for input in ["", "ws://broker:80", "tcp://", "broker:notaport", "tcp://:1883", "[::1"] {
            assert!(input.parse::<BrokerAddress>().is_err(), "{input:?} accepted");
        }
    }

    #[test]
    fn config_defaults() {
        let config = BrokerConfig::new(parse("tcp://localhost"));
        assert_eq!(config.client_id, "e-paper-cli");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert_eq!(config.disconnect_grace, Duration::from_millis(250));
        assert!(config.credentials.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn credentials_and_validation() {
        let config = BrokerConfig::new(parse("tcp://localhost"))
            .credentials(None, Some("secret".into()))
            .keep_alive(Duration::from_millis(500));
        let credentials = config.credentials.clone().unwrap();
        assert_eq!(credentials.username, "");
        assert!(!format!("{credentials:?}").contains("secret"));
        assert!(config.validate().is_err());

        let config = BrokerConfig::new(parse("tcp://localhost")).write_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
