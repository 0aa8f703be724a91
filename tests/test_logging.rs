//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format and level parsing from environment variables.

use topic_consumer::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_known_values() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("Compact"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("\tjson"), LogFormat::Json);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    assert_eq!(LogFormat::parse("yaml"), LogFormat::Json);
    assert_eq!(LogFormat::parse("123"), LogFormat::Json);
}

#[test]
fn test_log_level_parsing() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level(" WARN "), Level::WARN);
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level(""), Level::INFO);
    assert_eq!(parse_level("verbose"), Level::INFO);
}
