//! Broker client capability
//!
//! The pool never talks MQTT itself. It consumes two seams:
//! - `BrokerConnector` opens one connection per call and installs the
//!   connection-lost handler carried in `ConnectOptions`
//! - `BrokerClient` is the handle to that one connection
//!
//! Implementations are not expected to bound their own waits; the pool wraps
//! `connect` and `publish` in `tokio::time::timeout`.

use async_trait::async_trait;
use thiserror::Error;

use crate::broker::options::{ConnectOptions, QualityOfService};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker answered but refused (bad credentials, rejected packet).
    #[error("broker refused: {0}")]
    Refused(String),
    /// Socket or protocol level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The connection is already gone.
    #[error("connection closed")]
    Closed,
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Opens a connection and returns once the broker accepted it.
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerClient>, BrokerError>;
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publishes and waits for the acknowledgement `qos` implies.
    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError>;

    /// Requests a disconnect without waiting for it to complete.
    fn disconnect(&self);
}
