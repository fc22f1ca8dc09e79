mod settings;

use crate::broker::QualityOfService;
use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LogSettings, PoolSettings, ServerSettings, Settings};

/// Prefix of the environment variables that override file settings,
/// e.g. `MQGATE_POOL__IDLE_TIMEOUT_SECS=60`.
pub const ENV_PREFIX: &str = "MQGATE";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    let settings = Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        pool: PoolSettings {
            connect_timeout_ms: partial
                .pool
                .as_ref()
                .and_then(|p| p.connect_timeout_ms)
                .unwrap_or(default.pool.connect_timeout_ms),
            publish_timeout_ms: partial
                .pool
                .as_ref()
                .and_then(|p| p.publish_timeout_ms)
                .unwrap_or(default.pool.publish_timeout_ms),
            idle_timeout_secs: partial
                .pool
                .as_ref()
                .and_then(|p| p.idle_timeout_secs)
                .unwrap_or(default.pool.idle_timeout_secs),
            keep_alive_secs: partial
                .pool
                .as_ref()
                .and_then(|p| p.keep_alive_secs)
                .unwrap_or(default.pool.keep_alive_secs),
            client_id_prefix: partial
                .pool
                .as_ref()
                .and_then(|p| p.client_id_prefix.clone())
                .unwrap_or(default.pool.client_id_prefix),
            qos: partial
                .pool
                .as_ref()
                .and_then(|p| p.qos)
                .unwrap_or(default.pool.qos),
            max_packet_size: partial
                .pool
                .as_ref()
                .and_then(|p| p.max_packet_size)
                .unwrap_or(default.pool.max_packet_size),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    };

    validate(&settings)?;
    Ok(settings)
}

/// Rejects values that would make every broker call fail instantly.
fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let pool = &settings.pool;
    if pool.connect_timeout_ms == 0 || pool.publish_timeout_ms == 0 {
        return Err(ConfigError::Message(
            "pool timeouts must be greater than zero".to_string(),
        ));
    }
    if pool.idle_timeout_secs == 0 {
        return Err(ConfigError::Message(
            "pool.idle_timeout_secs must be greater than zero".to_string(),
        ));
    }
    QualityOfService::try_from(pool.qos)
        .map_err(|e| ConfigError::Message(format!("pool.qos: {e}")))?;
    // room for the fixed header and a short topic
    if pool.max_packet_size < 128 {
        return Err(ConfigError::Message(
            "pool.max_packet_size must be at least 128 bytes".to_string(),
        ));
    }
    if pool.client_id_prefix.is_empty() {
        return Err(ConfigError::Message(
            "pool.client_id_prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
