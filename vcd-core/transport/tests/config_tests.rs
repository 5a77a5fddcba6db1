//! 传输层配置测试

use std::time::Duration;
use vcd_transport::*;

#[test]
fn test_default_transport_config() {
    let config = TransportConfig::default();

    assert_eq!(config.org, "System");
    assert_eq!(config.api_version, "36.0");
    assert!(config.verify_ssl);
    assert_eq!(config.connect_timeout, 10);
    assert_eq!(config.request_timeout, 60);
}

#[test]
fn test_transport_config_timeouts() {
    let config = TransportConfig {
        connect_timeout: 5,
        request_timeout: 120,
        ..Default::default()
    };

    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.request_timeout(), Duration::from_secs(120));
}

#[test]
fn test_accept_header_and_login_name() {
    let config = TransportConfig::new("https://vcd.example.com/", "acme", "admin", "pw");

    assert_eq!(config.endpoint, "https://vcd.example.com");
    assert_eq!(config.accept_header(), "application/*+json;version=36.0");
    assert_eq!(config.login_name(), "admin@acme");
}

#[test]
fn test_transport_config_validation() {
    let mut config = TransportConfig::new("https://vcd.example.com", "acme", "admin", "pw");
    assert!(config.validate().is_ok());

    config.endpoint = String::new();
    assert!(config.validate().is_err());

    config.endpoint = "ftp://vcd.example.com".to_string();
    assert!(config.validate().is_err());

    config.endpoint = "https://vcd.example.com".to_string();
    config.username = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_transport_config_deserialize_with_defaults() {
    let json = r#"{"endpoint": "https://vcd.example.com", "username": "admin", "password": "pw"}"#;
    let config: TransportConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.endpoint, "https://vcd.example.com");
    assert_eq!(config.org, "System");
    assert_eq!(config.password, "pw");
    assert_eq!(config.request_timeout, 60);
}

#[test]
fn test_password_never_serialized() {
    let config = TransportConfig::new("https://vcd.example.com", "acme", "admin", "top-secret");
    let json = serde_json::to_string(&config).unwrap();

    assert!(!json.contains("top-secret"));
    assert!(json.contains("admin"));
}
