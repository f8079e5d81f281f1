//! Integration tests for logging system

use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LogLevel, LoggingConfig,
};
use core_runtime::CoreConfig;

#[test]
fn test_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("secret_access_key", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("application_key", "k"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("github_token", "ghp_x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("bucket", "photos"), "photos");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/srv/library/images/IMG_01.jpg"), "IMG_01.jpg");
    assert_eq!(strip_path("C:\\Users\\me\\Pictures\\a.png"), "a.png");
    assert_eq!(strip_path("a.png"), "a.png");
    assert_eq!(strip_path("/var/log/"), "");
}

#[test]
fn test_invalid_filter_is_rejected_before_install() {
    let config = LoggingConfig::default().with_filter("core_sync=verbose");
    assert!(init_logging(config).is_err());
}

#[test]
fn test_second_init_fails() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());
}

#[test]
fn test_logging_section_from_json() {
    let config = CoreConfig::from_json_str(
        r#"{
            "database": { "url": "sqlite::memory:" },
            "storage": { "provider": "local", "root": "/srv/photos" },
            "logging": { "format": "json", "level": "debug", "filter": "core_sync=trace" }
        }"#,
    )
    .unwrap();

    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.filter.as_deref(), Some("core_sync=trace"));
    assert!(!config.logging.enable_spans);
}
