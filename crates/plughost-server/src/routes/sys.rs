//! Harness endpoints under `/v1/sys`.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::translate::{decode_component, RenewResponse};
use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

const REVOKE_PREFIX: &str = "/v1/sys/leases/revoke/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/storage", get(storage))
        .route("/plugins/catalog/openapi", get(openapi))
        .route("/leases/renew", any(renew))
        .route("/leases/revoke", any(revoke))
        .route("/leases/revoke/", any(revoke_by_path))
        .route("/leases/revoke/*lease_id", any(revoke_by_path))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let entries = state
        .translator
        .storage()
        .list("")
        .await
        .map(|keys| keys.len())
        .unwrap_or(0);
    Json(json!({
        "plugin_running": state.translator.plugin_running(),
        "storage_entries": entries,
    }))
}

#[derive(Debug, Serialize)]
struct StoredValue {
    key: String,
    value: String,
}

async fn storage(State(state): State<AppState>) -> ApiResult<Json<Vec<StoredValue>>> {
    let storage = state.translator.storage();
    let keys = storage
        .list("")
        .await
        .map_err(|e| ApiError::Internal(format!("failed to list storage: {e}")))?;

    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        match storage.get(&key).await {
            Ok(Some(entry)) => entries.push(StoredValue {
                value: String::from_utf8_lossy(&entry.value).into_owned(),
                key,
            }),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "failed to get storage entry"),
        }
    }
    Ok(Json(entries))
}

async fn openapi(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state
        .host
        .openapi()
        .map(|catalog| Json(catalog.rewritten(state.mount())))
        .ok_or_else(|| ApiError::NotFound("OpenAPI document not available".to_string()))
}

fn require_write(method: &Method) -> ApiResult<()> {
    if *method == Method::PUT || *method == Method::POST {
        Ok(())
    } else {
        Err(ApiError::method_not_allowed())
    }
}

async fn renew(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> ApiResult<Json<RenewResponse>> {
    require_write(&method)?;
    state.translator.renew(&body).await.map(Json)
}

async fn revoke(State(state): State<AppState>, method: Method, body: Bytes) -> ApiResult<StatusCode> {
    require_write(&method)?;
    state.translator.revoke_body(&body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_by_path(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<StatusCode> {
    require_write(&method)?;
    let raw = uri.path().strip_prefix(REVOKE_PREFIX).unwrap_or_default();
    let lease_id = decode_component(raw);
    if lease_id.is_empty() {
        return Err(ApiError::BadRequest("lease_id is required in path".to_string()));
    }
    state.translator.revoke(&lease_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
