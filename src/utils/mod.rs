//! The `utils` module provides definitions shared across the gateway:
//! the error taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::{GatewayError, Operation};

#[cfg(test)]
mod tests;
