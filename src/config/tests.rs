use super::load_config;
use super::settings::Settings;
use crate::broker::QualityOfService;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Runs `f` with a fresh temporary directory as the working directory so
/// `load_config` only sees what the test writes.
fn in_temp_dir<R>(f: impl FnOnce() -> R) -> R {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");
    let result = f();
    env::set_current_dir(orig).expect("restore cwd");
    result
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.pool.connect_timeout(), Duration::from_secs(5));
    assert_eq!(settings.pool.publish_timeout(), Duration::from_secs(5));
    assert_eq!(settings.pool.idle_timeout(), Duration::from_secs(300));
    assert_eq!(settings.pool.keep_alive(), Duration::from_secs(2));
    assert_eq!(settings.pool.client_id_prefix, "mqgate");
    assert_eq!(settings.pool.qos(), QualityOfService::AtLeastOnce);
    assert_eq!(settings.pool.max_packet_size, 4 * 1024 * 1024);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn load_config_without_sources_uses_defaults() {
    let cfg = in_temp_dir(|| load_config().expect("load_config failed"));
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.pool.idle_timeout_secs, 300);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let cfg = in_temp_dir(|| {
        fs::create_dir_all("config").expect("create config dir");
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [pool]
            idle_timeout_secs = 60
            client_id_prefix = "edge"
        "#;
        fs::write("config/default.toml", toml).expect("write config file");
        load_config().expect("load_config failed")
    });

    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.pool.idle_timeout_secs, 60);
    assert_eq!(cfg.pool.client_id_prefix, "edge");
    // untouched keys keep their defaults
    assert_eq!(cfg.pool.connect_timeout_ms, 5_000);
    assert_eq!(cfg.log.level, "info");
}

#[test]
#[serial]
fn environment_overrides_file() {
    let cfg = temp_env::with_vars(
        [
            ("MQGATE_SERVER__PORT", Some("7070")),
            ("MQGATE_POOL__PUBLISH_TIMEOUT_MS", Some("250")),
            ("MQGATE_LOG__LEVEL", Some("debug")),
        ],
        || {
            in_temp_dir(|| {
                fs::create_dir_all("config").expect("create config dir");
                fs::write("config/default.toml", "[server]\nport = 9000\n")
                    .expect("write config file");
                load_config().expect("load_config failed")
            })
        },
    );

    assert_eq!(cfg.server.port, 7070);
    assert_eq!(cfg.pool.publish_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.log.level, "debug");
}

#[test]
#[serial]
fn zero_timeouts_are_rejected() {
    let result = temp_env::with_var("MQGATE_POOL__CONNECT_TIMEOUT_MS", Some("0"), || {
        in_temp_dir(load_config)
    });
    assert!(result.is_err());
}

#[test]
#[serial]
fn qos_and_packet_size_come_from_environment() {
    let cfg = temp_env::with_vars(
        [
            ("MQGATE_POOL__QOS", Some("2")),
            ("MQGATE_POOL__MAX_PACKET_SIZE", Some("65536")),
        ],
        || in_temp_dir(|| load_config().expect("load_config failed")),
    );

    assert_eq!(cfg.pool.qos(), QualityOfService::ExactlyOnce);
    assert_eq!(cfg.pool.max_packet_size, 65_536);
}

#[test]
#[serial]
fn unacknowledged_qos_is_rejected() {
    for level in ["0", "3"] {
        let result = temp_env::with_var("MQGATE_POOL__QOS", Some(level), || {
            in_temp_dir(load_config)
        });
        assert!(result.is_err(), "qos {level} accepted");
    }
}
