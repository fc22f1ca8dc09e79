//! The `error` module defines the error types shared across the gateway.
//!
//! `GatewayError` is what the pool and the HTTP layer speak; every variant
//! maps to exactly one response status in `transport::http`.

use std::time::Duration;

use thiserror::Error;

use crate::pool::Endpoint;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The inbound request could not be parsed or misses a required field.
    #[error("invalid publish request: {0}")]
    InvalidRequest(String),

    /// The broker was unreachable, rejected the handshake or refused the credentials.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailure { endpoint: Endpoint, reason: String },

    /// The broker rejected the publish or the client errored before the bound elapsed.
    #[error("failed to publish to {endpoint}: {reason}")]
    PublishFailure { endpoint: Endpoint, reason: String },

    /// Neither success nor failure was observed within the bound.
    #[error("{operation} to {endpoint} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: Operation,
        endpoint: Endpoint,
        after: Duration,
    },

    /// The pooled connection was torn down before the caller acquired it.
    #[error("connection to {endpoint} is closed")]
    ConnectionClosed { endpoint: Endpoint },
}

/// The bounded broker operation a timeout refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Publish,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Connect => write!(f, "connect"),
            Operation::Publish => write!(f, "publish"),
        }
    }
}
