use std::fmt;

use crate::broker::Credentials;

/// Identity of one pooled broker connection.
///
/// Two requests share a connection only when host, port and credentials all
/// match; a different login to the same broker gets its own session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, credentials: Option<Credentials>) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some(credentials) => write!(f, "{}@{}:{}", credentials.username, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}
