use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::{EventStore, MessageLookup};
use crate::dto::sns_dto::SesNotificationMessage;
use crate::error::{Error, Result};
use crate::models::event::{CanonicalEvent, EventType};
use crate::services::event_bus::{EventBus, EventHandler};
use crate::utils::{retry::exec_retry, time};

pub const EVENT_SAVE_MAX_RETRIES: usize = 3;

pub const EVENT_LOG_CONSUMER: &str = "event-log";
pub const WEBHOOK_DISPATCH_CONSUMER: &str = "webhook-dispatch";

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    lookup: Arc<dyn MessageLookup>,
    bus: Arc<EventBus>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, lookup: Arc<dyn MessageLookup>, bus: Arc<EventBus>) -> Self {
        Self { store, lookup, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Persists the event, then publishes it to every consumer group.
    pub async fn create(&self, event: CanonicalEvent) -> Result<()> {
        let store = &self.store;
        let target = &event;
        let saved = exec_retry(EVENT_SAVE_MAX_RETRIES, move || store.save_event(target)).await;
        if let Err(err) = saved {
            error!(event_id = %event.id, error = %err, "failed to save event");
            return Err(Error::PersistenceFailed(format!(
                "event {} not saved after {} attempts: {}",
                event.id, EVENT_SAVE_MAX_RETRIES, err
            )));
        }
        self.bus.publish(vec![event]).await
    }

    /// Turns a mail-provider notification into a canonical event.
    ///
    /// Returns `Ok(None)` for provider event types that have no canonical
    /// counterpart.
    pub async fn create_from_notification(
        &self,
        message: SesNotificationMessage,
        raw: JsonValue,
    ) -> Result<Option<CanonicalEvent>> {
        let Some(event_type) = EventType::from_provider(&message.event_type) else {
            warn!(event_type = %message.event_type, "ignoring unmapped provider event type");
            return Ok(None);
        };

        let owner = self
            .lookup
            .find_message_owner(&message.mail.message_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("no message with id {}", message.mail.message_id))
            })?;

        let headers = message.mail.common_headers.unwrap_or_default();
        let recipients = if headers.to.is_empty() {
            message.mail.destination
        } else {
            headers.to
        };

        let mut metadata = Map::new();
        metadata.insert("message".to_string(), raw);

        let event = CanonicalEvent {
            id: Uuid::new_v4(),
            event_type,
            recipients,
            cc_recipients: headers.cc,
            bcc_recipients: headers.bcc,
            metadata,
            organization_id: owner.organization_id,
            workspace_id: owner.workspace_id,
            created_at: time::now(),
        };

        self.create(event.clone()).await?;
        info!(event_id = %event.id, event_type = event.event_type.as_str(), workspace_id = %event.workspace_id, "event created");
        Ok(Some(event))
    }
}

/// Records every event that passes through the bus.
pub struct EventLogListener;

#[async_trait]
impl EventHandler for EventLogListener {
    async fn handle(&self, event: &CanonicalEvent) {
        info!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            organization_id = %event.organization_id,
            workspace_id = %event.workspace_id,
            recipients = event.recipients.len(),
            "event received"
        );
    }
}
