//! Schema validation helpers for Streamlens JSON5 configuration.

use serde_json::{Map, Value};

use super::SchemaMode;
use crate::ConfigError;

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "endpoints",
        "channel",
        "http",
        "storage",
        "analysis",
        "identity",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("endpoints") {
        validate_endpoints(value, layer, "endpoints")?;
    }
    if let Some(value) = map.get("channel") {
        validate_channel(value, layer, "channel")?;
    }
    if let Some(value) = map.get("http") {
        validate_http(value, layer, "http")?;
    }
    if let Some(value) = map.get("storage") {
        validate_storage(value, layer, "storage")?;
    }
    if let Some(value) = map.get("analysis") {
        validate_analysis(value, layer, "analysis")?;
    }
    if let Some(value) = map.get("identity") {
        validate_identity(value, layer, "identity")?;
    }

    Ok(())
}

/// Validate the "endpoints" block.
fn validate_endpoints(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["websocket_url", "http_url"], layer, path)?;
    if let Some(value) = map.get("websocket_url") {
        expect_string(value, layer, &join_path(path, "websocket_url"))?;
    }
    if let Some(value) = map.get("http_url") {
        expect_string(value, layer, &join_path(path, "http_url"))?;
    }
    Ok(())
}

/// Validate the "channel" block.
fn validate_channel(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "reconnect_attempts",
            "reconnect_delay_ms",
            "request_timeout_secs",
            "listing_stagger_ms",
            "event_buffer",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("reconnect_attempts") {
        expect_u64(value, layer, &join_path(path, "reconnect_attempts"))?;
    }
    if let Some(value) = map.get("reconnect_delay_ms") {
        expect_u64(value, layer, &join_path(path, "reconnect_delay_ms"))?;
    }
    if let Some(value) = map.get("request_timeout_secs") {
        expect_nullable_u64(value, layer, &join_path(path, "request_timeout_secs"))?;
    }
    if let Some(value) = map.get("listing_stagger_ms") {
        expect_u64(value, layer, &join_path(path, "listing_stagger_ms"))?;
    }
    if let Some(value) = map.get("event_buffer") {
        expect_u64(value, layer, &join_path(path, "event_buffer"))?;
    }
    Ok(())
}

/// Validate the "http" block.
fn validate_http(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["timeout_secs"], layer, path)?;
    if let Some(value) = map.get("timeout_secs") {
        expect_u64(value, layer, &join_path(path, "timeout_secs"))?;
    }
    Ok(())
}

/// Validate the "storage" block.
fn validate_storage(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["bucket", "stream_name"], layer, path)?;
    if let Some(value) = map.get("bucket") {
        expect_nullable_string(value, layer, &join_path(path, "bucket"))?;
    }
    if let Some(value) = map.get("stream_name") {
        expect_nullable_string(value, layer, &join_path(path, "stream_name"))?;
    }
    Ok(())
}

/// Validate the "analysis" block.
fn validate_analysis(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "model_id",
            "temperature",
            "top_p",
            "top_k",
            "max_tokens",
            "frequency",
            "list_length",
            "interval",
            "duration",
            "image_size",
            "platform",
            "system_prompt",
            "user_prompt",
        ],
        layer,
        path,
    )?;
    for key in ["model_id", "image_size", "system_prompt", "user_prompt"] {
        if let Some(value) = map.get(key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    for key in ["temperature", "top_p", "interval"] {
        if let Some(value) = map.get(key) {
            expect_f64(value, layer, &join_path(path, key))?;
        }
    }
    for key in ["top_k", "max_tokens", "frequency", "list_length", "duration"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("platform") {
        validate_platform(value, layer, &join_path(path, "platform"))?;
    }
    Ok(())
}

/// Validate analysis platform values.
fn validate_platform(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value.as_str() {
        Some("lambda") | Some("ecs") => Ok(()),
        Some(_) => Err(invalid_field(
            layer,
            path,
            "expected one of \"lambda\", \"ecs\"",
        )),
        None => Err(invalid_field(layer, path, "expected string")),
    }
}

/// Validate the "identity" block.
fn validate_identity(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["user_id"], layer, path)?;
    if let Some(value) = map.get("user_id") {
        expect_nullable_string(value, layer, &join_path(path, "user_id"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a JSON string or null.
fn expect_nullable_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() || value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string or null"))
    }
}

/// Expect a JSON u64 or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() || value.is_i64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected integer"))
    }
}

/// Expect a JSON u64 or null.
fn expect_nullable_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_null() || value.is_u64() || value.is_i64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected integer or null"))
    }
}

/// Expect a JSON f64 or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_f64() || value.is_u64() || value.is_i64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
