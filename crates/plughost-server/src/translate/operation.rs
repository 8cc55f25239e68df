//! HTTP verb and path to logical operation.

use crate::error::ApiError;
use axum::http::Method;
use percent_encoding::percent_decode_str;
use plughost_core::Operation;
use std::borrow::Cow;

/// Lifecycle operations selected by a path suffix or `?operation=`, in
/// precedence order.
const LIFECYCLE: [(&str, Operation); 4] = [
    ("revoke", Operation::Revoke),
    ("renew", Operation::Renew),
    ("rollback", Operation::Rollback),
    ("rotate", Operation::Rotate),
];

/// Percent-decode a URI component. Invalid UTF-8 is replaced.
pub fn decode_component(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Strip the API version and mount segments from a raw request path.
///
/// `/v1/plugin/creds/app` with mount `plugin` becomes `creds/app`. Paths
/// outside the mount keep everything after `/v1/`. The result is
/// percent-decoded.
pub fn normalize_path(uri_path: &str, mount: &str) -> String {
    let mount = mount.trim_matches('/');
    let decoded = decode_component(uri_path);
    let path = decoded.strip_prefix("/v1/").unwrap_or(&decoded);
    match path.strip_prefix(mount) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => path.to_string(),
    }
}

/// Resolve the operation for a request on an already normalized `path`.
///
/// Returns the operation together with the path the backend should see:
/// a lifecycle suffix is removed from it.
pub fn resolve_operation(
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Result<(Operation, String), ApiError> {
    let requested = query.and_then(operation_param);

    for (name, operation) in LIFECYCLE {
        let suffix = format!("/{name}");
        if path.ends_with(&suffix) || requested.as_deref() == Some(name) {
            let path = path.strip_suffix(&suffix).unwrap_or(path);
            return Ok((operation, path.to_string()));
        }
    }

    let operation = match method.as_str() {
        "GET" => Operation::Read,
        "POST" | "PUT" => Operation::Update,
        "DELETE" => Operation::Delete,
        "LIST" => Operation::List,
        _ => return Err(ApiError::MethodNotAllowed("unsupported method".to_string())),
    };
    Ok((operation, path.to_string()))
}

/// First `operation=` value of a query string, form-decoded.
fn operation_param(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "operation")
        .map(|(_, value)| decode_component(&value.replace('+', " ")).into_owned())
}
