use serde::{Deserialize, Serialize};

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}
