//! # mqgate
//!
//! `mqgate` is an HTTP-to-MQTT publish gateway. Each inbound `POST /publish`
//! names a broker, a topic and a payload; the gateway forwards the message
//! over a pooled broker connection and answers once the broker acknowledged it.
//!
//! ## Core Modules
//!
//! - `broker`: The broker client capability and its rumqttc-backed implementation.
//! - `config`: Loads gateway settings from defaults, an optional file and the environment.
//! - `pool`: Keeps at most one live connection per endpoint, with idle and loss eviction.
//! - `transport`: The HTTP surface that decodes requests and maps failures to statuses.
//! - `utils`: Shared error types and logging setup.

pub mod broker;
pub mod config;
pub mod pool;
pub mod transport;
pub mod utils;
