use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::settings::Settings;
use super::validation::{validate_config, ConfigError};

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "total_tokens", "tokens"];

/// Environment variable → (config path, value kind).
const ENV_OVERRIDES: [(&str, &[&str], EnvKind); 14] = [
    ("OPENAI_API_KEY", &["openai", "api_key"], EnvKind::String),
    ("OPENAI_BASE_URL", &["openai", "base_url"], EnvKind::String),
    ("OPENAI_MODEL", &["chatbot", "model"], EnvKind::String),
    ("OPENAI_TEMPERATURE", &["chatbot", "temperature"], EnvKind::Float),
    ("CLASSIFIER_MODEL", &["classifier", "model"], EnvKind::String),
    ("EMBEDDING_MODEL", &["classifier", "embedding_model"], EnvKind::String),
    ("VECTOR_STORE_PATH", &["classifier", "vector_store_path"], EnvKind::String),
    ("DATABASE_URL", &["database", "url"], EnvKind::String),
    ("DB_USER", &["database", "user"], EnvKind::String),
    ("DB_PASSWORD", &["database", "password"], EnvKind::String),
    ("API_HOST", &["server", "host"], EnvKind::String),
    ("API_PORT", &["server", "port"], EnvKind::Integer),
    ("LOG_DIR", &["logging", "log_dir"], EnvKind::String),
    ("STAGE_TIMEOUT_SECS", &["resilience", "stage_timeout_secs"], EnvKind::Integer),
];

#[derive(Clone, Copy)]
enum EnvKind {
    String,
    Integer,
    Float,
}

/// Loads `config.yml` + `secrets.yaml`, applies environment overrides and
/// produces validated [`Settings`].
#[derive(Debug, Clone)]
pub struct ConfigService {
    config_path: PathBuf,
    secrets_path: PathBuf,
}

impl ConfigService {
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        let config_path = explicit_path
            .or_else(|| env::var("RAGDESK_CONFIG_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.yml"));
        let secrets_path = config_path
            .parent()
            .map(|dir| dir.join("secrets.yaml"))
            .unwrap_or_else(|| PathBuf::from("secrets.yaml"));

        Self {
            config_path,
            secrets_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Raw merged configuration tree, before environment overrides.
    pub fn load_config(&self) -> Result<Value, ConfigError> {
        let public_config = load_yaml_file(&self.config_path)?;
        let secrets_config = load_yaml_file(&self.secrets_path)?;
        Ok(deep_merge(&public_config, &secrets_config))
    }

    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let mut config = self.load_config()?;
        apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        settings_from_value(config)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn settings_from_value(config: Value) -> Result<Settings, ConfigError> {
    validate_config(&config)?;
    serde_json::from_value(config).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    let value = serde_yaml::from_str::<Value>(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Parse(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for (key, path, kind) in ENV_OVERRIDES {
        let Some(raw) = lookup(key) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let value = match kind {
            EnvKind::String => Value::String(raw.to_string()),
            EnvKind::Integer => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| ConfigError::invalid(key, "expected a non-negative integer"))?,
            EnvKind::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| ConfigError::invalid(key, "expected a number"))?,
        };
        ensure_object_path(config, path, value);
    }
    Ok(())
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        Value::String(s) if looks_like_credential_url(s) => Value::String(redact_url_password(s)),
        _ => value.clone(),
    }
}

fn looks_like_credential_url(value: &str) -> bool {
    value.contains("://") && value.contains('@')
}

fn redact_url_password(value: &str) -> String {
    match reqwest::Url::parse(value) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some(REDACT_PLACEHOLDER)).is_err() {
                return REDACT_PLACEHOLDER.to_string();
            }
            url.to_string()
        }
        Ok(_) => value.to_string(),
        Err(_) => REDACT_PLACEHOLDER.to_string(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "openai": { "base_url": "https://api.openai.com", "request_timeout_secs": 60 },
            "server": { "port": 8000 }
        });
        let secrets = json!({
            "openai": { "api_key": "sk-test" }
        });

        let merged = deep_merge(&base, &secrets);

        assert_eq!(
            merged,
            json!({
                "openai": {
                    "base_url": "https://api.openai.com",
                    "request_timeout_secs": 60,
                    "api_key": "sk-test"
                },
                "server": { "port": 8000 }
            })
        );
    }

    #[test]
    fn env_overrides_create_nested_paths_and_parse_numbers() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("API_PORT", "9001"),
            ("OPENAI_TEMPERATURE", "0.2"),
            ("DATABASE_URL", "  "),
        ]);
        let mut config = json!({ "server": { "host": "127.0.0.1" } });

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config["openai"]["api_key"], "sk-env");
        assert_eq!(config["server"]["port"], 9001);
        assert_eq!(config["server"]["host"], "127.0.0.1");
        assert_eq!(config["chatbot"]["temperature"], 0.2);
        assert!(config.get("database").is_none());
    }

    #[test]
    fn env_override_with_bad_integer_is_rejected() {
        let mut config = json!({});
        let err = apply_env_overrides(&mut config, |key| {
            (key == "API_PORT").then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn settings_from_value_fills_defaults() {
        let settings = settings_from_value(json!({
            "classifier": { "top_k": 3 },
            "chatbot": { "history_window": 0 }
        }))
        .unwrap();

        assert_eq!(settings.classifier.top_k, 3);
        assert_eq!(settings.classifier.collection_name, "news_articles");
        assert_eq!(settings.chatbot.history_window, 0);
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "openai": { "api_key": "sk-live", "base_url": "https://api.openai.com" },
            "database": {
                "url": "postgresql://svc:hunter2@db:5432/news",
                "password": "hunter2",
                "max_connections": 5
            }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(redacted["openai"]["api_key"], "****");
        assert_eq!(redacted["openai"]["base_url"], "https://api.openai.com");
        assert_eq!(redacted["database"]["password"], "****");
        assert_eq!(redacted["database"]["max_connections"], 5);
        assert_eq!(
            redacted["database"]["url"],
            "postgresql://svc:****@db:5432/news"
        );
    }

    #[test]
    fn load_config_merges_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yml");
        fs::write(&config_path, "server:\n  port: 8100\n").unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "openai:\n  api_key: sk-file\n",
        )
        .unwrap();

        let service = ConfigService::new(Some(config_path));
        let config = service.load_config().unwrap();

        assert_eq!(config["server"]["port"], 8100);
        assert_eq!(config["openai"]["api_key"], "sk-file");
    }

    #[test]
    fn load_config_without_files_is_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(Some(dir.path().join("missing.yml")));
        assert_eq!(service.load_config().unwrap(), json!({}));
    }
}
