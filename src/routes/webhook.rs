use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::webhook_dto::{CreateWebhookPayload, WebhookResponse},
    error::Result,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/workspaces/{workspace_id}/webhooks",
    params(
        ("workspace_id" = Uuid, Path, description = "Workspace ID")
    ),
    request_body = CreateWebhookPayload,
    responses(
        (status = 201, description = "Webhook created successfully", body = WebhookResponse),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_webhook(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<CreateWebhookPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let webhook = state.webhook_service.create(workspace_id, payload).await?;
    Ok((StatusCode::CREATED, Json(WebhookResponse::from(webhook))))
}

#[utoipa::path(
    get,
    path = "/api/workspaces/{workspace_id}/webhooks",
    params(
        ("workspace_id" = Uuid, Path, description = "Workspace ID")
    ),
    responses(
        (status = 200, description = "Webhooks of the workspace", body = [WebhookResponse])
    )
)]
#[axum::debug_handler]
pub async fn list_webhooks(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let webhooks = state.webhook_service.list(workspace_id).await?;
    let body: Vec<WebhookResponse> = webhooks.into_iter().map(WebhookResponse::from).collect();
    Ok(Json(body))
}

#[utoipa::path(
    get,
    path = "/api/webhooks/{id}",
    params(
        ("id" = Uuid, Path, description = "Webhook ID")
    ),
    responses(
        (status = 200, description = "Webhook found", body = WebhookResponse),
        (status = 404, description = "Webhook not found")
    )
)]
#[axum::debug_handler]
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let webhook = state.webhook_service.get(id).await?;
    Ok(Json(WebhookResponse::from(webhook)))
}
