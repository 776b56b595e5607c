use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::database::store::{EventStore, MessageLookup, MessageOwner, TopicStore, WebhookStore};
use crate::error::{Error, Result};
use crate::models::event::{CanonicalEvent, EventType};
use crate::models::notification_topic::{NotificationTopic, Region, TopicStatus};
use crate::models::webhook::{Webhook, WebhookStatus};
use crate::models::webhook_log::{DeliveryStatus, WebhookDeliveryLog};

#[derive(Default)]
struct Inner {
    topics: Vec<NotificationTopic>,
    events: Vec<CanonicalEvent>,
    webhooks: Vec<Webhook>,
    logs: Vec<WebhookDeliveryLog>,
    /// Every write of a log, in order, including overwrites.
    log_writes: Vec<WebhookDeliveryLog>,
    messages: HashMap<String, MessageOwner>,
}

/// In-process implementation of every store, for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing_log_saves: AtomicUsize,
    failing_event_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("memory store mutex poisoned".to_string()))
    }

    /// Makes the next `n` log saves fail.
    pub fn fail_next_log_saves(&self, n: usize) {
        self.failing_log_saves.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` event saves fail.
    pub fn fail_next_event_saves(&self, n: usize) {
        self.failing_event_saves.store(n, Ordering::SeqCst);
    }

    pub fn register_message(&self, provider_message_id: &str, owner: MessageOwner) {
        if let Ok(mut inner) = self.lock() {
            inner.messages.insert(provider_message_id.to_string(), owner);
        }
    }

    pub fn topics(&self) -> Vec<NotificationTopic> {
        self.lock().map(|i| i.topics.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.lock().map(|i| i.events.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<WebhookDeliveryLog> {
        self.lock().map(|i| i.logs.clone()).unwrap_or_default()
    }

    pub fn log_writes(&self) -> Vec<WebhookDeliveryLog> {
        self.lock().map(|i| i.log_writes.clone()).unwrap_or_default()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn save_topic(&self, topic: &NotificationTopic) -> Result<()> {
        let mut inner = self.lock()?;
        if inner
            .topics
            .iter()
            .any(|t| t.region == topic.region || t.arn == topic.arn)
        {
            return Err(Error::PersistenceFailed(format!(
                "topic for region {} already exists",
                topic.region
            )));
        }
        inner.topics.push(topic.clone());
        Ok(())
    }

    async fn find_all_topics(&self) -> Result<Vec<NotificationTopic>> {
        Ok(self.lock()?.topics.clone())
    }

    async fn update_topic_status(&self, region: Region, status: TopicStatus) -> Result<()> {
        let mut inner = self.lock()?;
        let topic = inner
            .topics
            .iter_mut()
            .find(|t| t.region == region && t.status.can_transition_to(status))
            .ok_or_else(|| {
                Error::InvalidTopic(format!("no transitionable topic for region {}", region))
            })?;
        topic.status = status;
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn save_event(&self, event: &CanonicalEvent) -> Result<()> {
        if Self::take_failure(&self.failing_event_saves) {
            return Err(Error::PersistenceFailed("injected event save failure".into()));
        }
        let mut inner = self.lock()?;
        if !inner.events.iter().any(|e| e.id == event.id) {
            inner.events.push(event.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        self.lock()?.webhooks.push(webhook.clone());
        Ok(())
    }

    async fn find_webhook_by_id(&self, id: Uuid) -> Result<Option<Webhook>> {
        Ok(self.lock()?.webhooks.iter().find(|w| w.id == id).cloned())
    }

    async fn find_webhook_by_event_type(
        &self,
        workspace_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<Webhook>> {
        Ok(self
            .lock()?
            .webhooks
            .iter()
            .find(|w| {
                w.workspace_id == workspace_id
                    && w.status == WebhookStatus::Active
                    && w.subscribes_to(event_type)
            })
            .cloned())
    }

    async fn find_webhooks_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Webhook>> {
        Ok(self
            .lock()?
            .webhooks
            .iter()
            .filter(|w| w.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn save_log(&self, log: &WebhookDeliveryLog) -> Result<()> {
        if Self::take_failure(&self.failing_log_saves) {
            return Err(Error::PersistenceFailed("injected log save failure".into()));
        }
        let mut inner = self.lock()?;
        inner.log_writes.push(log.clone());
        match inner.logs.iter_mut().find(|l| l.id == log.id) {
            Some(existing) => *existing = log.clone(),
            None => inner.logs.push(log.clone()),
        }
        Ok(())
    }

    async fn claim_due_log(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Option<WebhookDeliveryLog>> {
        let mut inner = self.lock()?;
        let due = inner
            .logs
            .iter_mut()
            .filter(|l| {
                l.status == DeliveryStatus::Failure
                    && l.retries < max_retries
                    && l.next_send_at <= now
            })
            .min_by_key(|l| l.next_send_at);
        Ok(due.map(|log| {
            log.next_send_at = now + Duration::minutes(5);
            log.clone()
        }))
    }
}

#[async_trait]
impl MessageLookup for MemoryStore {
    async fn find_message_owner(&self, provider_message_id: &str) -> Result<Option<MessageOwner>> {
        Ok(self.lock()?.messages.get(provider_message_id).copied())
    }
}
