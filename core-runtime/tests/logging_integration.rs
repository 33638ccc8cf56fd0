//! Integration tests for logging system
//!
//! The global subscriber can be installed once per process, so initialization
//! is exercised in a single test.

use core_runtime::logging::{filter_directives, init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_init_once_then_reject() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_spans(false);

    init_logging(config.clone()).unwrap();
    tracing::info!(topic_id = "t1", position = 12.5, "Progress saved");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_config_from_host_json() {
    let config: LoggingConfig = serde_json::from_str(
        r#"{"format":"json","level":"trace","display_thread_info":true}"#,
    )
    .unwrap();

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Trace);
    assert!(config.display_thread_info);
    assert!(config.enable_spans);
    assert!(filter_directives(&config).contains("core_service=trace"));
}

#[test]
fn test_dependencies_stay_quiet() {
    let directives = filter_directives(&LoggingConfig::default().with_level(LogLevel::Trace));
    assert!(directives.contains("bridge_desktop=trace"));
    assert!(directives.contains("sqlx=warn"));
}
