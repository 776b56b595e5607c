pub mod health;
pub mod sns;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::SNS_EVENT_PATH, AppState};

pub fn router(state: AppState) -> Router {
    let sns_api = Router::new().route(SNS_EVENT_PATH, post(sns::handle_sns_event));

    let webhook_api = Router::new()
        .route(
            "/api/workspaces/:workspace_id/webhooks",
            get(webhook::list_webhooks).post(webhook::create_webhook),
        )
        .route("/api/webhooks/:id", get(webhook::get_webhook));

    Router::new()
        .route("/health", get(health::health))
        .merge(sns_api)
        .merge(webhook_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
