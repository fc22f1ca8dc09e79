//! The `broker` module is the gateway's view of an MQTT broker connection.
//!
//! It defines the capability the pool consumes (`BrokerConnector`,
//! `BrokerClient`), the options handed over on connect, and the production
//! implementation on top of `rumqttc`.

pub mod client;
pub mod options;
pub mod rumqtt;

pub use client::{BrokerClient, BrokerConnector, BrokerError};
pub use options::{ConnectOptions, ConnectionLostHandler, Credentials, QualityOfService};
pub use rumqtt::RumqttConnector;

#[cfg(test)]
pub(crate) mod testing;
