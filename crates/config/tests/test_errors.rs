//! Tests for error handling

use benchpilot_config::ConfigError;
use std::io;

#[test]
fn test_io_error_display() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err = ConfigError::Io(io_err);

    let display = format!("{}", err);
    assert!(display.contains("CONFIG I/O ERROR"));
    assert!(display.contains("file not found"));
}

#[test]
fn test_json_error_display() {
    let json_err: serde_json::Error =
        serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let err = ConfigError::Json(json_err);

    assert!(err.to_string().contains("CONFIG PARSE FAILED"));
}

#[test]
fn test_missing_api_key_mentions_env_var() {
    let err = ConfigError::MissingApiKey;
    assert!(err.to_string().contains("API_KEY"));
}

#[test]
fn test_error_trait() {
    fn check_error_trait<T: std::error::Error + Send + Sync + 'static>() {}
    check_error_trait::<ConfigError>();
}

#[test]
fn test_io_error_from() {
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "no permission");
    let err: ConfigError = io_err.into();

    match err {
        ConfigError::Io(_) => (),
        _ => panic!("Expected Io variant"),
    }
}
