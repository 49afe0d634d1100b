// routes.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{handler::webhook::coinbase_webhook, AppState};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/coinbase_webhook", post(coinbase_webhook))
        .route("/api/webhook/coinbase", post(coinbase_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state))
}
