use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::WebhookStore;
use crate::dto::webhook_dto::CreateWebhookPayload;
use crate::error::{Error, Result};
use crate::models::event::CanonicalEvent;
use crate::models::webhook::{Webhook, WebhookStatus};
use crate::models::webhook_log::{DeliveryAttempt, DeliveryStatus, WebhookDeliveryLog};
use crate::services::event_bus::EventHandler;
use crate::utils::http::{read_capped, MAX_BODY_BYTES};
use crate::utils::{crypto, retry::exec_retry, time};

pub const WEBHOOK_SIGNING_KEY_BITS: usize = 1024;
pub const MAX_WEBHOOK_LOG_RETRIES: usize = 3;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-Id";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn WebhookStore>,
    client: Client,
    max_retries: i32,
}

impl WebhookService {
    pub fn new(store: Arc<dyn WebhookStore>, timeout: Duration, max_retries: i32) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            client,
            max_retries,
        })
    }

    pub async fn create(&self, workspace_id: Uuid, payload: CreateWebhookPayload) -> Result<Webhook> {
        let (signing_key, _) = crypto::generate_key_pair(WEBHOOK_SIGNING_KEY_BITS)?;
        let signing_key_public = crypto::encoded_public_key(&signing_key)?;

        let mut events = Vec::with_capacity(payload.events.len());
        for event_type in payload.events {
            if !events.contains(&event_type) {
                events.push(event_type);
            }
        }
        let webhook = Webhook {
            id: Uuid::new_v4(),
            status: WebhookStatus::Active,
            url: payload.url,
            signing_key,
            signing_key_public,
            events,
            workspace_id,
            created_at: time::now(),
        };
        self.store.save_webhook(&webhook).await?;
        info!(webhook_id = %webhook.id, workspace_id = %workspace_id, "webhook created");
        Ok(webhook)
    }

    pub async fn get(&self, id: Uuid) -> Result<Webhook> {
        self.store
            .find_webhook_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Webhook with id {} not found", id)))
    }

    pub async fn list(&self, workspace_id: Uuid) -> Result<Vec<Webhook>> {
        self.store.find_webhooks_by_workspace(workspace_id).await
    }

    /// Delivers `event` to the workspace webhook subscribed to its type, if any.
    pub async fn handle_event(&self, event: &CanonicalEvent) -> Result<()> {
        let Some(webhook) = self
            .store
            .find_webhook_by_event_type(event.workspace_id, event.event_type)
            .await?
        else {
            return Ok(());
        };

        let payload = serde_json::to_string(event)?;
        let mut log = WebhookDeliveryLog {
            id: Uuid::new_v4(),
            status: DeliveryStatus::Pending,
            event_type: event.event_type,
            payload,
            retries: 0,
            next_send_at: time::now(),
            attempts: Vec::new(),
            webhook_id: webhook.id,
            workspace_id: webhook.workspace_id,
        };

        self.deliver(&webhook, &mut log).await
    }

    /// Re-delivers one due failed log. Returns `false` when none was due.
    pub async fn redeliver_once(&self) -> Result<bool> {
        let Some(mut log) = self
            .store
            .claim_due_log(time::now(), self.max_retries)
            .await?
        else {
            return Ok(false);
        };

        let Some(webhook) = self.store.find_webhook_by_id(log.webhook_id).await? else {
            warn!(log_id = %log.id, webhook_id = %log.webhook_id, "webhook of delivery log is gone");
            log.retries = self.max_retries;
            self.save_log(&log).await;
            return Ok(true);
        };
        if webhook.status != WebhookStatus::Active {
            log.retries = self.max_retries;
            self.save_log(&log).await;
            return Ok(true);
        }

        log.retries += 1;
        info!(log_id = %log.id, webhook_id = %webhook.id, retries = log.retries, "redelivering webhook");
        if let Err(err) = self.deliver(&webhook, &mut log).await {
            warn!(log_id = %log.id, error = %err, "redelivery failed");
        }
        Ok(true)
    }

    async fn deliver(&self, webhook: &Webhook, log: &mut WebhookDeliveryLog) -> Result<()> {
        let key = crypto::private_key_from_pem(&webhook.signing_key)?;
        let webhook_id = webhook.id.to_string();
        let timestamp = time::to_rfc3339(time::now());
        let signature = crypto::sign_request(&key, &webhook_id, &timestamp, log.payload.as_bytes());

        log.status = DeliveryStatus::Pending;
        log.attempts.push(DeliveryAttempt {
            signature: signature.clone(),
            sent_at: timestamp.clone(),
            response_status: None,
            response_body: None,
        });
        self.save_log(log).await;

        let sent = self
            .client
            .post(&webhook.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &signature)
            .header(WEBHOOK_ID_HEADER, &webhook_id)
            .header(TIMESTAMP_HEADER, &timestamp)
            .body(log.payload.clone())
            .send()
            .await;

        let outcome = match sent {
            Ok(resp) => {
                let status = resp.status();
                let body = match read_capped(resp, MAX_BODY_BYTES).await {
                    Ok((bytes, _)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(err) => {
                        warn!(webhook_id = %webhook.id, error = %err, "failed to read webhook response body");
                        String::new()
                    }
                };
                if let Some(attempt) = log.last_attempt_mut() {
                    attempt.response_status = Some(i32::from(status.as_u16()));
                    attempt.response_body = Some(body);
                }
                if status.is_success() {
                    Ok(())
                } else {
                    Err(Error::DeliveryFailed(format!("{} returned {}", webhook.url, status)))
                }
            }
            Err(err) => {
                if let Some(attempt) = log.last_attempt_mut() {
                    attempt.response_body = Some(err.to_string());
                }
                Err(Error::DeliveryFailed(format!("{}: {}", webhook.url, err)))
            }
        };

        match &outcome {
            Ok(()) => {
                log.status = DeliveryStatus::Success;
                info!(log_id = %log.id, webhook_id = %webhook.id, "webhook delivered");
            }
            Err(err) => {
                log.status = DeliveryStatus::Failure;
                log.next_send_at = time::now() + time::retry_backoff(log.attempts.len());
                warn!(log_id = %log.id, webhook_id = %webhook.id, error = %err, "webhook delivery failed");
            }
        }
        self.save_log(log).await;
        outcome
    }

    /// Writing a log never blocks delivery: failures are logged and dropped.
    async fn save_log(&self, log: &WebhookDeliveryLog) {
        let store = &self.store;
        let saved = exec_retry(MAX_WEBHOOK_LOG_RETRIES, move || store.save_log(log)).await;
        if let Err(err) = saved {
            error!(log_id = %log.id, error = %err, "failed to save webhook log");
        }
    }
}

#[async_trait]
impl EventHandler for WebhookService {
    async fn handle(&self, event: &CanonicalEvent) {
        if let Err(err) = self.handle_event(event).await {
            error!(event_id = %event.id, error = %err, "failed to dispatch webhook");
        }
    }
}
