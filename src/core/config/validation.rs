use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(openai) = expect_optional_object(root, "openai")? {
        validate_optional_string_field(openai, "openai.api_key", "api_key")?;
        validate_optional_string_field(openai, "openai.base_url", "base_url")?;
        validate_u64_field(
            openai,
            "openai.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(database) = expect_optional_object(root, "database")? {
        validate_optional_string_field(database, "database.url", "url")?;
        validate_u64_field(database, "database.max_connections", "max_connections", 1, 256)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(classifier) = expect_optional_object(root, "classifier")? {
        validate_f64_field(classifier, "classifier.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(
            classifier,
            "classifier.score_threshold",
            "score_threshold",
            -1.0,
            1.0,
        )?;
        validate_u64_field(classifier, "classifier.top_k", "top_k", 1, 100)?;
        validate_u64_field(
            classifier,
            "classifier.embedding_dimension",
            "embedding_dimension",
            1,
            65_536,
        )?;
        validate_u64_field(classifier, "classifier.example_chars", "example_chars", 1, 100_000)?;
        validate_u64_field(classifier, "classifier.input_chars", "input_chars", 1, 1_000_000)?;
        validate_u64_field(
            classifier,
            "classifier.max_input_length",
            "max_input_length",
            1,
            10_000_000,
        )?;
        validate_optional_string_field(classifier, "classifier.collection_name", "collection_name")?;
    }

    if let Some(chatbot) = expect_optional_object(root, "chatbot")? {
        validate_f64_field(chatbot, "chatbot.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(chatbot, "chatbot.history_window", "history_window", 0, 100_000)?;
        validate_u64_field(
            chatbot,
            "chatbot.max_conversation_id_length",
            "max_conversation_id_length",
            1,
            1_000,
        )?;
    }

    if let Some(resilience) = expect_optional_object(root, "resilience")? {
        validate_u64_field(resilience, "resilience.max_attempts", "max_attempts", 1, 20)?;
        validate_u64_field(
            resilience,
            "resilience.initial_backoff_ms",
            "initial_backoff_ms",
            0,
            60_000,
        )?;
        validate_u64_field(
            resilience,
            "resilience.max_backoff_ms",
            "max_backoff_ms",
            0,
            600_000,
        )?;
        validate_u64_field(
            resilience,
            "resilience.stage_timeout_secs",
            "stage_timeout_secs",
            1,
            3_600,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let number = value
        .as_u64()
        .ok_or_else(|| config_type_error(path, "non-negative integer"))?;
    if number < min || number > max {
        return Err(ConfigError::invalid(
            path,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let number = value
        .as_f64()
        .ok_or_else(|| config_type_error(path, "number"))?;
    if !(min..=max).contains(&number) {
        return Err(ConfigError::invalid(
            path,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let items = value
        .as_array()
        .ok_or_else(|| config_type_error(path, "array of strings"))?;
    if items.iter().any(|item| !item.is_string()) {
        return Err(config_type_error(path, "array of strings"));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::invalid(path, format!("expected {}", expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_config() {
        assert!(validate_config(&json!({})).is_ok());
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(validate_config(&json!([1, 2])).is_err());
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let err = validate_config(&json!({ "classifier": { "top_k": 0 } })).unwrap_err();
        assert!(err.to_string().contains("classifier.top_k"));
    }

    #[test]
    fn rejects_temperature_above_two() {
        let err = validate_config(&json!({ "chatbot": { "temperature": 3.5 } })).unwrap_err();
        assert!(err.to_string().contains("chatbot.temperature"));
    }

    #[test]
    fn null_score_threshold_is_allowed() {
        assert!(validate_config(&json!({ "classifier": { "score_threshold": null } })).is_ok());
    }

    #[test]
    fn rejects_non_string_origins() {
        let err = validate_config(&json!({ "server": { "cors_allowed_origins": ["*", 3] } }))
            .unwrap_err();
        assert!(err.to_string().contains("cors_allowed_origins"));
    }
}
