//! Tests for logging configuration and format parsing
//!
//! Covers the pure parsing helpers behind `LOG_FORMAT` and `LOG_LEVEL`, and
//! that repeated initialisation is harmless.

use mediation_engine::observability::logging::{init_logging, parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_known_values() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    for raw in ["", "xml", "yaml", "123"] {
        assert_eq!(LogFormat::parse(raw), LogFormat::Json, "format {raw:?}");
    }
}

#[test]
fn test_parse_level_is_case_insensitive() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("Warn"), Level::WARN);
    assert_eq!(parse_level("DEBUG"), Level::DEBUG);
    assert_eq!(parse_level("trace"), Level::TRACE);
    assert_eq!(parse_level("info"), Level::INFO);
}

#[test]
fn test_parse_level_unknown_defaults_to_info() {
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::DEBUG, LogFormat::Compact, false);
    init_logging(Level::INFO, LogFormat::Json, true);
    tracing::info!("logging initialised twice");
}
