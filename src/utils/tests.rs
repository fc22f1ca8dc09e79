use std::time::Duration;

use super::error::{GatewayError, Operation};
use super::logging;
use crate::pool::Endpoint;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("bogus");
}

#[test]
fn timeout_error_names_operation_and_bound() {
    let err = GatewayError::Timeout {
        operation: Operation::Publish,
        endpoint: Endpoint::new("broker", 1883, None),
        after: Duration::from_millis(5000),
    };
    assert_eq!(err.to_string(), "publish to broker:1883 timed out after 5000ms");
}

#[test]
fn connect_failure_carries_upstream_reason() {
    let err = GatewayError::ConnectFailure {
        endpoint: Endpoint::new("localhost", 1883, None),
        reason: "connection refused".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "failed to connect to localhost:1883: connection refused"
    );
}
