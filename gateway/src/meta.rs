//! Service descriptor, health, and stats documents.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

/// GET `/`.
pub async fn service_descriptor(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat_completions": ["/chat/completions", "/v1/chat/completions"],
            "health": state.config.health_check_path,
            "stats": state.config.stats_path,
            "verify": "/verify",
        }
    }))
}

/// GET health document (path configurable).
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET stats document (path configurable). Counter reads may observe a
/// transition in progress.
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "uptime_seconds": state.uptime_seconds(),
        "scheduler": state.scheduler.stats(),
    }))
}
