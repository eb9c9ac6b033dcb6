//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_init_logging_only_succeeds_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());

    let second = init_logging(config);
    assert!(matches!(second, Err(core_runtime::Error::Config(_))));
}

#[test]
fn test_catalog_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("token", "abcd1234"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("oauth_signature", "cs&as"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_secret", "as"), "[REDACTED]");
}

#[test]
fn test_identifiers_pass_through() {
    assert_eq!(redact_if_sensitive("release_id", "249504"), "249504");
    assert_eq!(redact_if_sensitive("folder", "Uncategorized"), "Uncategorized");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/lib/crates/library.db"), "library.db");
    assert_eq!(strip_path("D:\\data\\library.db"), "library.db");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
