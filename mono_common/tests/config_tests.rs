//! Configuration loading from real files.

use std::io::Write;

use mono_common::config::{BalanceConfig, ConfigError, ShutdownMode};

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
hertz = 832.0
kp = 5.0
ki = 0.004
kd = 1100.0
startup_speed = 5.1
brake_current = 6.1
fault_delay_switch_full = 201.0
shutdown_mode = "off_after_30m"

[radio]
channel = 99
"#
    )
    .unwrap();

    let config = BalanceConfig::load(file.path()).unwrap();
    assert_eq!(config.hertz, 832.0);
    assert_eq!(config.kp, 5.0);
    assert_eq!(config.startup_speed, 5.1);
    assert_eq!(config.shutdown_mode, ShutdownMode::OffAfter30m);
    assert_eq!(config.radio.channel, 99);
}

#[test]
fn missing_file_is_a_distinct_error() {
    let err = BalanceConfig::load(std::path::Path::new("/nonexistent/balance.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn invalid_file_reports_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not valid toml @@@").unwrap();
    let err = BalanceConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn serialized_config_roundtrips() {
    let config = BalanceConfig::default();
    let toml = toml::to_string(&config).unwrap();
    let reloaded = BalanceConfig::from_toml(&toml).unwrap();
    assert_eq!(reloaded.hertz, config.hertz);
    assert_eq!(reloaded.kp, config.kp);
    assert_eq!(reloaded.brake_current, config.brake_current);
    assert_eq!(reloaded.radio.address, config.radio.address);
}
