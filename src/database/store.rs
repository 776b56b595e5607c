//! Persistence seams used by the services.
//!
//! Every store is an async trait so services can run against Postgres in
//! production and against [`MemoryStore`](super::MemoryStore) in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::event::{CanonicalEvent, EventType};
use crate::models::notification_topic::{NotificationTopic, Region, TopicStatus};
use crate::models::webhook::Webhook;
use crate::models::webhook_log::WebhookDeliveryLog;

#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn save_topic(&self, topic: &NotificationTopic) -> Result<()>;
    async fn find_all_topics(&self) -> Result<Vec<NotificationTopic>>;
    async fn update_topic_status(&self, region: Region, status: TopicStatus) -> Result<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save_event(&self, event: &CanonicalEvent) -> Result<()>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()>;
    async fn find_webhook_by_id(&self, id: Uuid) -> Result<Option<Webhook>>;
    /// First ACTIVE webhook of the workspace subscribed to `event_type`.
    async fn find_webhook_by_event_type(
        &self,
        workspace_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<Webhook>>;
    async fn find_webhooks_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Webhook>>;
    /// Inserts the log, or replaces it when a log with the same id exists.
    async fn save_log(&self, log: &WebhookDeliveryLog) -> Result<()>;
    /// Claims one failed log that is due for re-delivery.
    async fn claim_due_log(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Option<WebhookDeliveryLog>>;
}

/// Organization and workspace that sent a provider message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageOwner {
    pub organization_id: Uuid,
    pub workspace_id: Uuid,
}

#[async_trait]
pub trait MessageLookup: Send + Sync {
    async fn find_message_owner(&self, provider_message_id: &str) -> Result<Option<MessageOwner>>;
}
