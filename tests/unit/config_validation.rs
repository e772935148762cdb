use std::time::Duration;

use opc_data_logger::config::{ConfigError, LoggerConfig};
use opc_data_logger::connection::RetryPolicy;

#[test]
fn default_config_is_valid() {
    assert_eq!(LoggerConfig::default().validate(), Ok(()));
}

#[test]
fn keep_alive_must_be_shorter_than_session_timeout() {
    let config = LoggerConfig {
        keep_alive_interval: Duration::from_secs(60),
        session_timeout: Duration::from_secs(60),
        ..LoggerConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::KeepAliveTooSlow { .. })
    ));

    // Irrelevant when keep-alive is off
    let config = LoggerConfig {
        keep_alive_enabled: false,
        ..config
    };
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn read_timeout_must_be_shorter_than_each_cadence() {
    let config = LoggerConfig {
        log_interval: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        ..LoggerConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ReadTimeoutTooLong { task: "logging", .. })
    ));

    let config = LoggerConfig {
        keep_alive_interval: Duration::from_secs(2),
        read_timeout: Duration::from_secs(3),
        ..LoggerConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ReadTimeoutTooLong { task: "keep-alive", .. })
    ));
}

#[test]
fn points_must_be_present_and_unique() {
    let empty = LoggerConfig {
        points: vec![],
        ..LoggerConfig::default()
    };
    assert_eq!(empty.validate(), Err(ConfigError::NoPoints));

    let blank = LoggerConfig {
        points: vec!["ns=1;s=Tag1".into(), "  ".into()],
        ..LoggerConfig::default()
    };
    assert_eq!(blank.validate(), Err(ConfigError::EmptyPoint(1)));

    let duplicate = LoggerConfig {
        points: vec!["ns=1;s=Tag1".into(), "ns=1;s=Tag1".into()],
        ..LoggerConfig::default()
    };
    assert_eq!(
        duplicate.validate(),
        Err(ConfigError::DuplicatePoint("ns=1;s=Tag1".into()))
    );
}

#[test]
fn cadences_must_be_positive() {
    let config = LoggerConfig {
        log_interval: Duration::ZERO,
        ..LoggerConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroInterval("log interval")));
}

#[test]
fn retry_policy_must_be_usable() {
    let no_attempts = LoggerConfig {
        retry: RetryPolicy::from_millis(0, 2_000, 10_000),
        ..LoggerConfig::default()
    };
    assert!(matches!(no_attempts.validate(), Err(ConfigError::InvalidRetry(_))));

    let inverted = LoggerConfig {
        retry: RetryPolicy::from_millis(5, 20_000, 10_000),
        ..LoggerConfig::default()
    };
    assert!(matches!(inverted.validate(), Err(ConfigError::InvalidRetry(_))));
}

#[test]
fn point_set_keeps_configured_order() {
    let config = LoggerConfig {
        points: vec!["ns=2;s=Flow".into(), "ns=2;i=7".into()],
        ..LoggerConfig::default()
    };
    let set = config.point_set();
    assert_eq!(set.labels().collect::<Vec<_>>(), vec!["Flow", "ns=2;i=7"]);
}

#[test]
fn points_sharing_a_column_label_are_rejected() {
    let config = LoggerConfig {
        points: vec!["ns=1;s=Tag1".to_string(), "ns=2;s=Tag1".to_string()],
        ..LoggerConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::DuplicateLabel {
            label: "Tag1".to_string(),
            first: "ns=1;s=Tag1".to_string(),
            second: "ns=2;s=Tag1".to_string(),
        })
    );
}

#[test]
fn point_with_empty_label_is_rejected() {
    let config = LoggerConfig {
        points: vec!["ns=1;s=Tag1".to_string(), "ns=1;s=".to_string()],
        ..LoggerConfig::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::EmptyLabel("ns=1;s=".to_string()))
    );
}
