use hb_domain::config::{Config, ConfigSeverity, StoreBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn empty_file_is_a_valid_config() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.turn.max_rounds, 5);
    assert_eq!(config.turn.retry_attempts, 2);
    assert_eq!(config.memory.cooldown_secs, 300);
    assert!((config.memory.similarity_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(config.store.backend, StoreBackend::Memory);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn turn_and_memory_sections_override() {
    let toml_str = r#"
[turn]
max_rounds = 3
token_ceiling = 20000

[memory]
cooldown_secs = 60
similarity_threshold = 0.9
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.turn.max_rounds, 3);
    assert_eq!(config.turn.token_ceiling, 20_000);
    assert_eq!(config.turn.retry_attempts, 2);
    assert_eq!(config.memory.cooldown_secs, 60);
}

#[test]
fn default_config_has_no_hard_errors() {
    let issues = Config::default().validate();
    assert!(!Config::has_errors(&issues), "{issues:?}");
    // The in-memory backend is flagged.
    assert!(issues
        .iter()
        .any(|e| e.field == "store.backend" && e.severity == ConfigSeverity::Warning));
}

#[test]
fn rest_store_requires_base_url() {
    let config: Config = toml::from_str("[store]\nbackend = \"rest\"\n").unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "store.base_url" && e.severity == ConfigSeverity::Error));
}

#[test]
fn out_of_range_threshold_is_an_error() {
    let config: Config = toml::from_str("[memory]\nsimilarity_threshold = 1.5\n").unwrap();
    assert!(Config::has_errors(&config.validate()));
}

#[test]
fn zero_rounds_is_an_error() {
    let config: Config = toml::from_str("[turn]\nmax_rounds = 0\n").unwrap();
    let issues = config.validate();
    assert!(issues.iter().any(|e| e.field == "turn.max_rounds"));
}
