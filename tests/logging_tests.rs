use cvl_optimizer::config::LoggingConfig;
use cvl_optimizer::logging::{LogContext, get_logger_with_context, init_logging, min_level, parse_log_level};
use tracing::Level;

#[test]
fn level_helpers() {
    assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
    assert!(parse_log_level("loud").is_err());
    assert_eq!(min_level(Level::WARN, Level::DEBUG), Level::DEBUG);
    assert_eq!(min_level(Level::ERROR, Level::INFO), Level::INFO);
}

#[test]
fn init_is_idempotent_and_loggers_are_usable() {
    let cfg = LoggingConfig {
        level: "DEBUG".to_string(),
        console_level: Some("INFO".to_string()),
        file_level: Some("DEBUG".to_string()),
        file: None,
        ..LoggingConfig::default()
    };
    assert!(init_logging(&cfg).is_ok());
    assert!(init_logging(&cfg).is_ok());

    let logger = get_logger_with_context(
        LogContext::new("controller")
            .with_device_instance(21)
            .with_field("battery", "com.victronenergy.battery.ttyUSB0".to_string()),
    );
    logger.info("CVL 55.21 V (below_target)");
    logger.warn("Tick skipped [missing_field]");
}
