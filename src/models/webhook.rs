use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::event::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookStatus {
    Active,
    Inactive,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Active => "ACTIVE",
            WebhookStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(WebhookStatus::Active),
            "INACTIVE" => Ok(WebhookStatus::Inactive),
            other => Err(format!("unknown webhook status: {}", other)),
        }
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: Uuid,
    pub status: WebhookStatus,
    pub url: String,
    /// PKCS#8 PEM. Never serialized.
    #[serde(skip)]
    pub signing_key: String,
    /// Base64 of the SPKI PEM, handed to the owner for verification.
    pub signing_key_public: String,
    pub events: Vec<EventType>,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

impl fmt::Debug for Webhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhook")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("url", &self.url)
            .field("signing_key", &"<redacted>")
            .field("events", &self.events)
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}
