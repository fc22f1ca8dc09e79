use serde::{Deserialize, Deserializer};

use crate::broker::Credentials;
use crate::pool::Endpoint;
use crate::utils::GatewayError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1883;

/// One publish, as accepted on the inbound side.
///
/// Missing or `null` `host`/`port` fall back to `localhost:1883`; `topic` is
/// optional at the type level so a request without it can be rejected
/// explicitly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    #[serde(deserialize_with = "host_or_default")]
    pub host: String,
    #[serde(deserialize_with = "port_or_default")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub payload: String,
}

fn host_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(|| DEFAULT_HOST.to_string()))
}

fn port_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or(DEFAULT_PORT))
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for PublishRequest {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            topic: None,
            payload: String::new(),
        }
    }
}

impl PublishRequest {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        let credentials =
            Credentials::from_parts(self.username.as_deref(), self.password.as_deref());
        Endpoint::new(self.host.clone(), self.port, credentials)
    }

    /// Checks the request can be forwarded and returns its topic.
    ///
    /// A publish topic must be present, non-empty and free of the `+`/`#`
    /// subscription wildcards.
    pub fn validate(&self) -> Result<&str, GatewayError> {
        let topic = self
            .topic
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidRequest("missing topic".to_string()))?;

        if topic.is_empty() {
            return Err(GatewayError::InvalidRequest("empty topic".to_string()));
        }
        if topic.contains(['+', '#']) {
            return Err(GatewayError::InvalidRequest(format!(
                "wildcards are not allowed in publish topic '{topic}'"
            )));
        }
        if self.host.is_empty() || self.port == 0 {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid broker address '{}:{}'",
                self.host, self.port
            )));
        }
        Ok(topic)
    }
}
