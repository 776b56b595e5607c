use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    EmailSend,
    EmailDelivered,
    EmailOpened,
    EmailClicked,
    EmailBounced,
    #[serde(rename = "EMAIL_REPORTED")]
    EmailComplained,
    EmailRejected,
    EmailDeliveryDelayed,
    EmailUnsubscribed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EmailSend => "EMAIL_SEND",
            EventType::EmailDelivered => "EMAIL_DELIVERED",
            EventType::EmailOpened => "EMAIL_OPENED",
            EventType::EmailClicked => "EMAIL_CLICKED",
            EventType::EmailBounced => "EMAIL_BOUNCED",
            EventType::EmailComplained => "EMAIL_REPORTED",
            EventType::EmailRejected => "EMAIL_REJECTED",
            EventType::EmailDeliveryDelayed => "EMAIL_DELIVERY_DELAYED",
            EventType::EmailUnsubscribed => "EMAIL_UNSUBSCRIBED",
        }
    }

    /// Maps the mail provider's `eventType` field onto the canonical type.
    pub fn from_provider(event_type: &str) -> Option<Self> {
        match event_type {
            "Send" => Some(EventType::EmailSend),
            "Delivery" => Some(EventType::EmailDelivered),
            "Open" => Some(EventType::EmailOpened),
            "Click" => Some(EventType::EmailClicked),
            "Bounce" => Some(EventType::EmailBounced),
            "Complaint" => Some(EventType::EmailComplained),
            "Reject" => Some(EventType::EmailRejected),
            "DeliveryDelay" => Some(EventType::EmailDeliveryDelayed),
            "Subscription" => Some(EventType::EmailUnsubscribed),
            _ => None,
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(JsonValue::String(s.to_string()))
            .map_err(|_| format!("unknown event type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub recipients: Vec<String>,
    pub cc_recipients: Vec<String>,
    pub bcc_recipients: Vec<String>,
    pub metadata: Map<String, JsonValue>,
    pub organization_id: Uuid,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}
