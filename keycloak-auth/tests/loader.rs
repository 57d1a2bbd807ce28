use std::io::Write;

use jsonwebtoken::Algorithm;
use keycloak_auth::{ConfigError, SettingsLoader, ValidationMode};
use serial_test::serial;
use tempfile::NamedTempFile;

const YAML: &str = "\
server:
  port: 8000
keycloak:
  server_url: http://yaml-host:8080
  realm: yaml-realm
  client_id: yaml-client
  verify_ssl: false
  jwks_cache_ttl_secs: 120
  allowed_algorithms: [RS256, ES256]
";

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn clear_env(prefix: &str) {
    for (key, _) in std::env::vars() {
        if key.starts_with(prefix) {
            std::env::remove_var(key);
        }
    }
}

fn loader(file: &NamedTempFile) -> SettingsLoader {
    SettingsLoader::new()
        .with_yaml_file(file.path())
        .with_env_prefix("KCLOADER_")
        .without_dotenv()
}

#[test]
#[serial]
fn yaml_section_is_loaded() {
    clear_env("KCLOADER_");
    let file = yaml_file(YAML);

    let settings = loader(&file).load().unwrap();
    assert_eq!(settings.server_url, "http://yaml-host:8080");
    assert_eq!(settings.realm, "yaml-realm");
    assert_eq!(settings.client_id, "yaml-client");
    assert!(!settings.verify_tls);
    assert_eq!(settings.jwks_cache_ttl_secs, 120);
    assert_eq!(
        settings.allowed_algorithms,
        vec![Algorithm::RS256, Algorithm::ES256]
    );
    assert_eq!(settings.http_timeout_secs, 10);
}

#[test]
#[serial]
fn env_overrides_yaml() {
    clear_env("KCLOADER_");
    let file = yaml_file(YAML);
    std::env::set_var("KCLOADER_REALM", "env-realm");
    std::env::set_var("KCLOADER_CLIENT_SECRET", "env-secret");
    std::env::set_var("KCLOADER_VALIDATION_MODE", "introspection");

    let settings = loader(&file).load().unwrap();
    clear_env("KCLOADER_");

    assert_eq!(settings.realm, "env-realm");
    assert_eq!(settings.server_url, "http://yaml-host:8080");
    assert_eq!(settings.client_secret.as_deref(), Some("env-secret"));
    assert_eq!(settings.validation_mode, ValidationMode::Introspection);
}

#[test]
#[serial]
fn overrides_win_over_env() {
    clear_env("KCLOADER_");
    let file = yaml_file(YAML);
    std::env::set_var("KCLOADER_REALM", "env-realm");

    let settings = loader(&file)
        .with_override("realm", "override-realm")
        .load()
        .unwrap();
    clear_env("KCLOADER_");

    assert_eq!(settings.realm, "override-realm");
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env("KCLOADER_");
    let settings = SettingsLoader::new()
        .with_yaml_file("/nonexistent/keycloak.yaml")
        .with_env_prefix("KCLOADER_")
        .without_dotenv()
        .load()
        .unwrap();

    assert_eq!(settings.server_url, "http://localhost:8080");
    assert_eq!(settings.realm, "master");
    assert_eq!(settings.jwks_cache_ttl_secs, 300);
}

#[test]
#[serial]
fn custom_section() {
    clear_env("KCLOADER_");
    let file = yaml_file("auth:\n  realm: other\n");

    let settings = loader(&file).with_section("auth").load().unwrap();
    assert_eq!(settings.realm, "other");
}

#[test]
#[serial]
fn env_can_be_disabled() {
    let file = yaml_file(YAML);
    std::env::set_var("KEYCLOAK_REALM", "from-env");

    let settings = SettingsLoader::new()
        .with_yaml_file(file.path())
        .without_env()
        .load()
        .unwrap();
    std::env::remove_var("KEYCLOAK_REALM");

    assert_eq!(settings.realm, "yaml-realm");
}

#[test]
#[serial]
fn invalid_number_is_rejected() {
    clear_env("KCLOADER_");
    let file = yaml_file(YAML);
    std::env::set_var("KCLOADER_LEEWAY_SECS", "soon");

    let err = loader(&file).load().unwrap_err();
    clear_env("KCLOADER_");

    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "leeway_secs"));
}

#[test]
#[serial]
fn malformed_yaml_is_a_load_error() {
    clear_env("KCLOADER_");
    let file = yaml_file("keycloak: [unclosed");

    let err = loader(&file).load().unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
#[serial]
fn without_yaml_reads_env_only() {
    clear_env("KCLOADER_");
    std::env::set_var("KCLOADER_SERVER_URL", "https://sso.example.com");
    std::env::set_var("KCLOADER_AUDIENCE", "orders-api");

    let settings = SettingsLoader::new()
        .without_yaml_file()
        .with_env_prefix("KCLOADER_")
        .without_dotenv()
        .load()
        .unwrap();
    clear_env("KCLOADER_");

    assert_eq!(settings.server_url, "https://sso.example.com");
    assert!(settings.audience_check_enabled());
}

#[test]
#[serial]
fn tls_alias_respects_layer_order() {
    clear_env("KCLOADER_");
    let file = yaml_file("keycloak:\n  verify_ssl: false\n");
    std::env::set_var("KCLOADER_VERIFY_TLS", "true");

    for _ in 0..50 {
        let settings = loader(&file).load().unwrap();
        assert!(settings.verify_tls);
    }
    clear_env("KCLOADER_");
}

#[test]
#[serial]
fn tls_alias_in_env_overrides_yaml() {
    clear_env("KCLOADER_");
    let file = yaml_file("keycloak:\n  verify_tls: true\n");
    std::env::set_var("KCLOADER_VERIFY_SSL", "false");

    let settings = loader(&file).load().unwrap();
    clear_env("KCLOADER_");

    assert!(!settings.verify_tls);
}

#[test]
#[serial]
fn tls_override_beats_env_alias() {
    clear_env("KCLOADER_");
    let file = yaml_file(YAML);
    std::env::set_var("KCLOADER_VERIFY_SSL", "false");

    let settings = loader(&file)
        .with_override("verify_tls", "true")
        .load()
        .unwrap();
    clear_env("KCLOADER_");

    assert!(settings.verify_tls);
}
