//! Route configuration.

mod sys;

use crate::{error::ApiResult, state::AppState, translate::Envelope};
use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{header, Method},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer};

/// Largest request body accepted.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Create the application router.
///
/// `/v1/sys/*` is served by the harness itself; `/v1/<mount>/*` and any
/// other unmatched path is forwarded to the plugin.
pub fn create_router(state: AppState) -> Router {
    let common_middleware = ServiceBuilder::new()
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT));

    let mount = format!("/v1/{}", state.mount());

    Router::new()
        .route("/", any(usage))
        .nest("/v1/sys", sys::router())
        .route(&mount, any(forward))
        .route(&format!("{mount}/*rest"), any(forward))
        .fallback(forward)
        .layer(common_middleware)
        .with_state(state)
}

async fn usage(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.host.usage_info(state.port),
    )
}

async fn forward(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> ApiResult<Json<Envelope>> {
    state.translator.handle(&method, &uri, &body).await.map(Json)
}
