//! The `transport` module is responsible for the inbound side of the gateway:
//! an HTTP endpoint that decodes publish requests and forwards them to the
//! connection pool.

pub mod http;
pub mod message;

pub use http::{router, serve, start_http_server, wait_for_shutdown};
pub use message::HealthResponse;
