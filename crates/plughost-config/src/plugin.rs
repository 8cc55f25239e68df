//! Free-form plugin configuration.

use crate::validation::ConfigError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Parse the plugin configuration string.
///
/// Accepts either a JSON object (`{"ttl": 3600}`) or comma separated
/// `key=value` pairs (`ttl=3600,region=eu`). Every value ends up as a string.
pub fn parse_plugin_config(input: &str) -> Result<HashMap<String, String>, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(HashMap::new());
    }

    if trimmed.starts_with('{') {
        let object: Map<String, Value> = serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::PluginConfigJson(e.to_string()))?;
        return Ok(object
            .into_iter()
            .map(|(k, v)| (k, stringify(v)))
            .collect());
    }

    let mut result = HashMap::new();
    for pair in trimmed.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::PluginConfigPair(pair.to_string()))?;
        result.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(result)
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
