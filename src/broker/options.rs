use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::client::BrokerError;

/// Username/password pair presented to the broker on connect.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Builds credentials only when both halves are present; a lone username
    /// or password is ignored.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) => Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// MQTT delivery guarantee requested for a publish.
///
/// Only acknowledged levels exist: a publish is reported as delivered once
/// the broker answered PUBACK (QoS 1) or PUBCOMP (QoS 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityOfService {
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QualityOfService {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(format!("unsupported QoS level {other}, expected 1 or 2")),
        }
    }
}

/// Invoked by a connector when the transport drops without a local disconnect.
pub type ConnectionLostHandler = Arc<dyn Fn(BrokerError) + Send + Sync>;

/// Everything a connector needs to open one broker connection.
#[derive(Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Always false for pooled connections: loss is handled by the pool.
    pub auto_reconnect: bool,
    pub credentials: Option<Credentials>,
    /// Largest MQTT packet, in bytes, sent or accepted on this connection.
    pub max_packet_size: usize,
    pub on_connection_lost: ConnectionLostHandler,
}

impl ConnectOptions {
    pub fn broker_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("credentials", &self.credentials)
            .field("max_packet_size", &self.max_packet_size)
            .finish_non_exhaustive()
    }
}
