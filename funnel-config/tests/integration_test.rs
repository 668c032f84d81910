//! Integration tests for funnel-config

use funnel_config::*;
use std::io::Write;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = FunnelConfig::default();
    assert!(config.validate_all().is_ok());
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("FUNNEL_HTTP_TIMEOUT", Some("60")),
        ("FUNNEL_HTTP_BASE_URL", Some("https://api.example.com")),
        ("FUNNEL_RETRY_MAX_ATTEMPTS", Some("5")),
        ("FUNNEL_RETRY_BASE_DELAY_MS", Some("250")),
        ("FUNNEL_CIRCUIT_FAILURE_THRESHOLD", Some("7")),
        ("FUNNEL_CIRCUIT_TIMEOUT", Some("45")),
        ("FUNNEL_LOG_LEVEL", Some("debug")),
    ];

    with_vars(vars, || {
        let loader = ConfigLoader::new();
        let config = loader.from_env().unwrap();

        assert_eq!(config.http.timeout, Duration::from_secs(60));
        assert_eq!(config.http.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.http.retry.max_attempts, 5);
        assert_eq!(config.http.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.http.circuit_breaker.failure_threshold, 7);
        assert_eq!(config.http.circuit_breaker.timeout, Duration::from_secs(45));
        assert_eq!(config.logging.level, LogLevel::Debug);
    });
}

#[test]
fn test_invalid_env_value_is_reported() {
    with_vars(vec![("FUNNEL_RETRY_MAX_ATTEMPTS", Some("many"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
        assert!(err.to_string().contains("RETRY_MAX_ATTEMPTS"));
    });
}

#[test]
fn test_env_override_is_validated() {
    with_vars(vec![("FUNNEL_RETRY_MAX_ATTEMPTS", Some("0"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::DomainError { .. }));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("ACADEMY_HTTP_USER_AGENT", Some("Academy/2.0"))], || {
        let config = ConfigLoader::with_prefix("ACADEMY").from_env().unwrap();
        assert_eq!(config.http.user_agent, "Academy/2.0");
    });
}

#[test]
fn test_yaml_config_serialization() {
    let config = FunnelConfig::default();
    let yaml = serde_yaml::to_string(&config).unwrap();

    let parsed: FunnelConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.http.retry.max_delay, Duration::from_millis(5000));
}

#[test]
fn test_sample_config_parses() {
    let sample = FunnelConfig::generate_sample();
    assert!(sample.starts_with("# Funnel configuration"));

    let parsed: FunnelConfig = serde_yaml::from_str(&sample).unwrap();
    assert!(parsed.validate_all().is_ok());
}

#[test]
fn test_comprehensive_config_file() {
    let yaml = r#"
http:
  timeout: 15
  user_agent: "Academy Sync"
  verify_ssl: false
  base_url: "https://crm.example.com/api/v4"
  retry:
    max_attempts: 4
    base_delay_ms: 200
    max_delay_ms: 2000
    backoff_multiplier: 3.0
    jitter_ms: 0
  circuit_breaker:
    failure_threshold: 3
    timeout: 10

logging:
  level: warn
  format: json
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(Vec::<(&str, Option<&str>)>::new(), || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();

        assert_eq!(config.http.timeout, Duration::from_secs(15));
        assert!(!config.http.verify_ssl);
        assert_eq!(config.http.retry.max_attempts, 4);
        assert_eq!(config.http.retry.backoff_multiplier, 3.0);
        assert_eq!(config.http.retry.jitter, Duration::ZERO);
        assert_eq!(config.http.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.http.circuit_breaker.success_threshold, 2);
        assert_eq!(config.http.circuit_breaker.timeout, Duration::from_secs(10));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Json);
    });
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let yaml = r#"
http:
  retry:
    base_delay_ms: 1000
    max_delay_ms: 10
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let err = ConfigLoader::new().from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("http.retry"));
}

#[test]
fn test_missing_config_file() {
    let err = ConfigLoader::new()
        .from_file("/nonexistent/funnel.yaml")
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileReadError(_)));
}
