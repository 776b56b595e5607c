use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let topics = state.topic_service.topics().await;
    let body = json!({
        "status": "ok",
        "topics": topics.len(),
        "subscribers": state.bus.subscriber_count().await,
    });
    (StatusCode::OK, Json(body))
}
