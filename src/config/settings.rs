use std::time::Duration;

use serde::Deserialize;

use crate::broker::QualityOfService;

/// Top-level configuration settings for the gateway.
///
/// Includes settings for the HTTP server, the connection pool and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub pool: PoolSettings,
    pub log: LogSettings,
}

/// Configuration settings for the HTTP server.
///
/// Defines the host and port the publish endpoint binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker connection pool.
///
/// Every network wait is bounded by one of these values.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    pub connect_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    pub keep_alive_secs: u64,
    pub client_id_prefix: String,
    /// MQTT QoS level for forwarded messages: 1 or 2.
    pub qos: u8,
    /// Bound on a single MQTT packet in bytes, payload and topic included.
    pub max_packet_size: usize,
}

impl PoolSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Falls back to QoS 1 for levels `load_config` would have rejected.
    pub fn qos(&self) -> QualityOfService {
        QualityOfService::try_from(self.qos).unwrap_or(QualityOfService::AtLeastOnce)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub pool: Option<PartialPoolSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPoolSettings {
    pub connect_timeout_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub keep_alive_secs: Option<u64>,
    pub client_id_prefix: Option<String>,
    pub qos: Option<u8>,
    pub max_packet_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            publish_timeout_ms: 5_000,
            idle_timeout_secs: 300,
            keep_alive_secs: 2,
            client_id_prefix: "mqgate".to_string(),
            qos: 1,
            max_packet_size: 4 * 1024 * 1024,
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            pool: PoolSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
