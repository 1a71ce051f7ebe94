use sa_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn registry_backend_defaults_to_memory() {
    let config = Config::default();
    assert_eq!(
        config.registry.backend,
        sa_domain::config::RegistryBackend::Memory
    );
}

#[test]
fn redis_backend_parses_from_toml() {
    let toml_str = r#"
[registry]
backend = "redis"
redis_url = "redis://cache:6379"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.registry.backend, sa_domain::config::RegistryBackend::Redis);
    assert_eq!(config.registry.redis_url, "redis://cache:6379");
}
