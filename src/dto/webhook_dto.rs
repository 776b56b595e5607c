use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::event::EventType;
use crate::models::webhook::Webhook;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookPayload {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    #[schema(value_type = Vec<String>)]
    pub events: Vec<EventType>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub id: Uuid,
    pub status: String,
    pub url: String,
    pub signing_key_public: String,
    #[schema(value_type = Vec<String>)]
    pub events: Vec<EventType>,
    pub workspace_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Webhook> for WebhookResponse {
    fn from(w: Webhook) -> Self {
        Self {
            id: w.id,
            status: w.status.as_str().to_string(),
            url: w.url,
            signing_key_public: w.signing_key_public,
            events: w.events,
            workspace_id: w.workspace_id,
            created_at: w.created_at,
        }
    }
}
