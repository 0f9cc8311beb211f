use std::sync::Arc;

use axum::{middleware, routing::{get, post}, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::settlement::{processor_webhook, settlement_handler},
    middleware::auth,
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Protected settlement routes (require auth)
    let protected_routes = settlement_handler().layer(middleware::from_fn(auth));

    // Public routes: the webhook authenticates via its HMAC signature
    let public_routes = Router::new().route("/webhook/processor", post(processor_webhook));

    let settlement_routes = Router::new()
        .merge(protected_routes)
        .merge(public_routes);

    let api_route = Router::new()
        .nest("/settlement", settlement_routes)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
