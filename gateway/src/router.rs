//! Route table and middleware assembly.

use crate::error::ApiError;
use crate::state::AppState;
use crate::{chat, meta, verify};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, Uri, header};
use axum::routing::{get, post};
use relay_types::GatewayError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full gateway router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let body_limit = state.config.body_size_limit;

    Router::new()
        .route("/", get(meta::service_descriptor))
        .route(&state.config.health_check_path, get(meta::health))
        .route(&state.config.stats_path, get(meta::stats))
        .route("/chat/completions", post(chat::chat_completions))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/verify", post(verify::verify_credentials))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-goog-api-key"),
            header::USER_AGENT,
            header::ACCEPT,
        ]);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "unparseable CORS origin, allowing any");
            layer.allow_origin(Any)
        }
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError(GatewayError::NotFound(uri.path().to_string()))
}

async fn method_not_allowed() -> ApiError {
    ApiError(GatewayError::MethodNotAllowed)
}
