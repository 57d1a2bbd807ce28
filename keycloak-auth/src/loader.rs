//! Layered loading of [`KeycloakSettings`].
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. `config.yaml` (the `keycloak:` section)
//! 3. `.env` file (loaded into the process environment, never overwriting
//!    variables that are already set)
//! 4. Environment variables (`KEYCLOAK_REALM` overrides `keycloak.realm`)
//! 5. Explicit overrides given to the loader
//!
//! ```ignore
//! let settings = SettingsLoader::new()
//!     .with_yaml_file("deploy/config.yaml")
//!     .with_override("realm", "staging")
//!     .load()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jsonwebtoken::Algorithm;
use tracing::debug;

use crate::config::{ConfigError, KeycloakSettings, ValidationMode};

/// Keys understood by the loader, in YAML spelling. Aliases precede their
/// canonical key so the canonical spelling wins within one layer.
const KEYS: &[&str] = &[
    "server_url",
    "realm",
    "client_id",
    "client_secret",
    "audience",
    "verify_ssl",
    "verify_tls",
    "jwks_cache_ttl_secs",
    "jwks_min_refresh_interval_secs",
    "http_timeout_secs",
    "leeway_secs",
    "allowed_algorithms",
    "validation_mode",
];

/// Map accepted spellings to the key they set.
fn canonical_key(key: &str) -> &str {
    match key {
        "verify_ssl" => "verify_tls",
        other => other,
    }
}

/// Builder that merges configuration sources into [`KeycloakSettings`].
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    yaml_path: Option<PathBuf>,
    section: String,
    env_prefix: Option<String>,
    dotenv: bool,
    overrides: HashMap<String, String>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self {
            yaml_path: Some(PathBuf::from("config.yaml")),
            section: "keycloak".into(),
            env_prefix: Some("KEYCLOAK_".into()),
            dotenv: true,
            overrides: HashMap::new(),
        }
    }
}

impl SettingsLoader {
    /// Loader with the default sources: `config.yaml`, `.env` and `KEYCLOAK_*`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the YAML layer from `path` instead of `config.yaml`.
    pub fn with_yaml_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.yaml_path = Some(path.into());
        self
    }

    pub fn without_yaml_file(mut self) -> Self {
        self.yaml_path = None;
        self
    }

    /// Top-level YAML key holding the settings (default: `keycloak`).
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// Environment variable prefix (default: `KEYCLOAK_`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.dotenv = false;
        self
    }

    /// Highest-priority value for `key` (YAML spelling, e.g. `"realm"`).
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.overrides
            .insert(canonical_key(&key).to_string(), value.into());
        self
    }

    /// Merge every configured source and build the settings.
    pub fn load(&self) -> Result<KeycloakSettings, ConfigError> {
        let mut values = HashMap::new();

        if let Some(path) = &self.yaml_path {
            load_yaml_file(path, &self.section, &mut values)?;
        }

        if let Some(prefix) = &self.env_prefix {
            if self.dotenv {
                let _ = dotenvy::dotenv();
            }
            for key in KEYS {
                let var = format!("{prefix}{}", key.to_ascii_uppercase());
                if let Ok(value) = std::env::var(&var) {
                    values.insert(canonical_key(key).to_string(), value);
                }
            }
        }

        for (key, value) in &self.overrides {
            values.insert(key.clone(), value.clone());
        }

        debug!(keys = ?values.keys().collect::<Vec<_>>(), "Keycloak settings sources merged");
        apply(values)
    }
}

/// Load the settings section of a YAML file. A missing file is not an error.
fn load_yaml_file(
    path: &Path,
    section: &str,
    values: &mut HashMap<String, String>,
) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    load_yaml_str(&content, section, values)
}

fn load_yaml_str(
    content: &str,
    section: &str,
    values: &mut HashMap<String, String>,
) -> Result<(), ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;

    let Some(serde_yaml::Value::Mapping(map)) = yaml.get(section) else {
        return Ok(());
    };

    for (key, value) in map {
        let Some(key) = key.as_str() else {
            continue;
        };
        if let Some(value) = yaml_scalar(value) {
            values.insert(canonical_key(key).to_string(), value);
        }
    }
    Ok(())
}

/// Render a YAML leaf as the string an environment variable would carry.
/// Sequences are joined with commas.
fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Sequence(seq) => Some(
            seq.iter()
                .filter_map(yaml_scalar)
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    }
}

fn apply(values: HashMap<String, String>) -> Result<KeycloakSettings, ConfigError> {
    let mut settings = KeycloakSettings::default();

    for (key, raw) in values {
        let value = raw.trim();
        match key.as_str() {
            "server_url" => settings.server_url = value.to_string(),
            "realm" => settings.realm = value.to_string(),
            "client_id" => settings.client_id = value.to_string(),
            "client_secret" => settings.client_secret = non_empty(value),
            "audience" => settings.audience = non_empty(value),
            "verify_tls" => settings.verify_tls = parse_bool(&key, value)?,
            "jwks_cache_ttl_secs" => settings.jwks_cache_ttl_secs = parse_u64(&key, value)?,
            "jwks_min_refresh_interval_secs" => {
                settings.jwks_min_refresh_interval_secs = parse_u64(&key, value)?
            }
            "http_timeout_secs" => settings.http_timeout_secs = parse_u64(&key, value)?,
            "leeway_secs" => settings.leeway_secs = parse_u64(&key, value)?,
            "allowed_algorithms" => settings.allowed_algorithms = parse_algorithms(value)?,
            "validation_mode" => settings.validation_mode = value.parse::<ValidationMode>()?,
            _ => {}
        }
    }

    Ok(settings)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{value}'"),
    })
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|alg| !alg.is_empty())
        .map(|alg| {
            alg.parse::<Algorithm>().map_err(|_| ConfigError::Invalid {
                key: "allowed_algorithms".into(),
                message: format!("unknown algorithm '{alg}'"),
            })
        })
        .collect()
}
