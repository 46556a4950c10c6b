use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::{any, delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use utoipa::OpenApi;

use super::{auth::require_auth, handlers, middleware, openapi::ApiDoc};
use crate::AppState;
use crate::ws;

/// Public routes (no auth required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/openapi.json", get(openapi_json))
}

/// API routes, guarded by the bearer token when configured
fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health/lapi", get(handlers::lapi_health))
        .route("/v1/decisions", get(handlers::list_decisions))
        .route("/v1/decisions/{id}", delete(handlers::delete_decision))
        .route(
            "/v1/decisions/{id}/alerts",
            get(handlers::get_decision_alerts),
        )
        .route("/v1/hosts", get(handlers::list_hosts))
        .route("/v1/hosts/{ip}", get(handlers::get_host))
        .route("/v1/sync", post(handlers::trigger_sync))
        .route("/v1/ws/{channel}", any(ws::ws_handler))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

/// Layers shared by the production and test routers
fn common_layers(router: Router) -> Router {
    router
        .layer(axum::middleware::from_fn(middleware::http_metrics))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(RequestBodyLimitLayer::new(64 * 1024))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let Some(origin) = &state.settings.http.cors_origin else {
        return CorsLayer::new();
    };
    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Err(e) => {
            tracing::warn!(origin = %origin, error = %e, "ignoring invalid cors_origin");
            CorsLayer::new()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let router = public_routes()
        .merge(api_routes(state.clone()))
        .with_state(state.clone());

    common_layers(router).layer(cors_layer(&state))
}

/// Router without CORS, for tests
pub fn create_test_router(state: Arc<AppState>) -> Router {
    let router = public_routes()
        .merge(api_routes(state.clone()))
        .with_state(state);

    common_layers(router)
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
