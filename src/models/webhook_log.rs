use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::event::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failure,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Success => "SUCCESS",
            DeliveryStatus::Failure => "FAILURE",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeliveryStatus::Pending),
            "SUCCESS" => Ok(DeliveryStatus::Success),
            "FAILURE" => Ok(DeliveryStatus::Failure),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub signature: String,
    /// The exact timestamp string that was signed and sent.
    pub sent_at: String,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDeliveryLog {
    pub id: Uuid,
    pub status: DeliveryStatus,
    pub event_type: EventType,
    pub payload: String,
    pub retries: i32,
    pub next_send_at: DateTime<Utc>,
    pub attempts: Vec<DeliveryAttempt>,
    pub webhook_id: Uuid,
    pub workspace_id: Uuid,
}

impl WebhookDeliveryLog {
    pub fn last_attempt_mut(&mut self) -> Option<&mut DeliveryAttempt> {
        self.attempts.last_mut()
    }
}
