//! The plugin's self-described path catalog.
//!
//! After start the host issues a help request; a backend that answers with
//! an `openapi` document gets its paths catalogued here for usage text and
//! for the discovery endpoint.

use crate::logical::LogicalResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One documented operation on a path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OasOperation {
    /// Short summary.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Operations declared on one path pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OasPathItem {
    /// Path description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Path parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Value>,
    /// GET operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<OasOperation>,
    /// POST operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<OasOperation>,
    /// PATCH operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<OasOperation>,
    /// DELETE operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<OasOperation>,
}

impl OasPathItem {
    /// HTTP verbs this path supports. `LIST` is implied by path parameters.
    pub fn verbs(&self) -> Vec<&'static str> {
        let mut verbs = Vec::new();
        if self.get.is_some() {
            verbs.push("GET");
        }
        if self.post.is_some() {
            verbs.push("POST");
        }
        if self.patch.is_some() {
            verbs.push("PATCH");
        }
        if self.delete.is_some() {
            verbs.push("DELETE");
        }
        if !self.parameters.is_empty() {
            verbs.push("LIST");
        }
        verbs
    }

    /// Documented operations in display order, paired with their verb.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &OasOperation)> {
        [
            ("GET", self.get.as_ref()),
            ("POST", self.post.as_ref()),
            ("PATCH", self.patch.as_ref()),
            ("DELETE", self.delete.as_ref()),
        ]
        .into_iter()
        .filter_map(|(verb, op)| op.map(|op| (verb, op)))
    }
}

/// Typed view of an OpenAPI document; only paths are modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OasDocument {
    /// Path pattern to declared operations.
    #[serde(default)]
    pub paths: BTreeMap<String, OasPathItem>,
}

/// A discovered document: the typed catalog plus the raw JSON it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PathCatalog {
    document: OasDocument,
    raw: Map<String, Value>,
}

impl PathCatalog {
    /// Build a catalog from a raw OpenAPI object.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let document: OasDocument = serde_json::from_value(value.clone())?;
        let raw = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self { document, raw })
    }

    /// Extract the catalog from a help response.
    ///
    /// Returns `Ok(None)` when the response carries no `openapi` object.
    pub fn from_help_response(response: &LogicalResponse) -> Result<Option<Self>, serde_json::Error> {
        match response.data.as_ref().and_then(|d| d.get("openapi")) {
            Some(value @ Value::Object(_)) => Self::from_value(value.clone()).map(Some),
            _ => Ok(None),
        }
    }

    /// Typed document.
    pub fn document(&self) -> &OasDocument {
        &self.document
    }

    /// Full request path for a catalogued pattern.
    pub fn mounted_path(mount: &str, path: &str) -> String {
        format!("/v1/{}/{}", mount.trim_matches('/'), path.trim_start_matches('/'))
    }

    /// The raw document with every path prefixed by `/v1/<mount>`.
    pub fn rewritten(&self, mount: &str) -> Value {
        let mut doc = self.raw.clone();
        if let Some(Value::Object(paths)) = doc.remove("paths") {
            let rewritten: Map<String, Value> = paths
                .into_iter()
                .map(|(path, item)| (Self::mounted_path(mount, &path), item))
                .collect();
            doc.insert("paths".to_string(), Value::Object(rewritten));
        }
        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "openapi": "3.0.2",
            "info": {"title": "kv"},
            "paths": {
                "/config": {
                    "description": "Configure the backend",
                    "get": {"summary": "Read config"},
                    "post": {"summary": "Write config"}
                },
                "/creds/{name}": {
                    "parameters": [{"name": "name", "in": "path"}],
                    "get": {"summary": "Generate credentials"},
                    "delete": {}
                }
            }
        })
    }

    #[test]
    fn test_verbs_from_path_item() {
        let catalog = PathCatalog::from_value(sample()).unwrap();
        let paths = &catalog.document().paths;

        assert_eq!(paths["/config"].verbs(), vec!["GET", "POST"]);
        assert_eq!(paths["/creds/{name}"].verbs(), vec!["GET", "DELETE", "LIST"]);
    }

    #[test]
    fn test_rewritten_prefixes_mount() {
        let catalog = PathCatalog::from_value(sample()).unwrap();
        let doc = catalog.rewritten("plugin");

        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/v1/plugin/config"));
        assert!(paths.contains_key("/v1/plugin/creds/{name}"));
        assert_eq!(doc["info"]["title"], "kv");
    }

    #[test]
    fn test_from_help_response_without_openapi() {
        let response = LogicalResponse::with_data(Map::new());
        assert!(PathCatalog::from_help_response(&response).unwrap().is_none());
        assert!(PathCatalog::from_help_response(&LogicalResponse::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_from_help_response_rejects_malformed_paths() {
        let mut data = Map::new();
        data.insert("openapi".into(), json!({"paths": {"/x": {"get": "nope"}}}));
        let response = LogicalResponse::with_data(data);
        assert!(PathCatalog::from_help_response(&response).is_err());
    }
}
