use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::database::store::{EventStore, MessageLookup, MessageOwner, TopicStore, WebhookStore};
use crate::error::{Error, Result};
use crate::models::event::{CanonicalEvent, EventType};
use crate::models::notification_topic::{NotificationTopic, Region, TopicStatus};
use crate::models::webhook::{Webhook, WebhookStatus};
use crate::models::webhook_log::{DeliveryAttempt, DeliveryStatus, WebhookDeliveryLog};
use crate::utils::crypto;

/// How long a claimed log stays invisible to other re-delivery workers.
const CLAIM_LEASE_SECS: i64 = 300;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(Error::Internal)
}

fn row_to_topic(row: &PgRow) -> Result<NotificationTopic> {
    Ok(NotificationTopic {
        id: row.try_get("id")?,
        region: parse_column(row, "region")?,
        arn: row.try_get("arn")?,
        status: parse_column(row, "status")?,
    })
}

fn row_to_webhook(row: &PgRow) -> Result<Webhook> {
    let signing_key: String = row.try_get("signing_key")?;
    let events: Json<Vec<EventType>> = row.try_get("events")?;
    Ok(Webhook {
        id: row.try_get("id")?,
        status: parse_column(row, "status")?,
        url: row.try_get("url")?,
        signing_key_public: crypto::encoded_public_key(&signing_key)?,
        signing_key,
        events: events.0,
        workspace_id: row.try_get("workspace_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_log(row: &PgRow) -> Result<WebhookDeliveryLog> {
    let attempts: Json<Vec<DeliveryAttempt>> = row.try_get("attempts")?;
    Ok(WebhookDeliveryLog {
        id: row.try_get("id")?,
        status: parse_column::<DeliveryStatus>(row, "status")?,
        event_type: parse_column::<EventType>(row, "event_type")?,
        payload: row.try_get("payload")?,
        retries: row.try_get("retries")?,
        next_send_at: row.try_get("next_send_at")?,
        attempts: attempts.0,
        webhook_id: row.try_get("webhook_id")?,
        workspace_id: row.try_get("workspace_id")?,
    })
}

#[async_trait]
impl TopicStore for PgStore {
    async fn save_topic(&self, topic: &NotificationTopic) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO notification_topics (id, region, arn, status) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(topic.id)
        .bind(topic.region.as_str())
        .bind(&topic.arn)
        .bind(topic.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_all_topics(&self) -> Result<Vec<NotificationTopic>> {
        let rows = sqlx::query(r#"SELECT id, region, arn, status FROM notification_topics"#)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_topic).collect()
    }

    async fn update_topic_status(&self, region: Region, status: TopicStatus) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE notification_topics SET status = $1, updated_at = NOW()
               WHERE region = $2 AND status <> 'INACTIVE'"#,
        )
        .bind(status.as_str())
        .bind(region.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::InvalidTopic(format!(
                "no transitionable topic for region {}",
                region
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn save_event(&self, event: &CanonicalEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, recipients, cc_recipients, bcc_recipients, metadata, organization_id, workspace_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(Json(&event.recipients))
        .bind(Json(&event.cc_recipients))
        .bind(Json(&event.bcc_recipients))
        .bind(Json(&event.metadata))
        .bind(event.organization_id)
        .bind(event.workspace_id)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookStore for PgStore {
    async fn save_webhook(&self, webhook: &Webhook) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhooks (id, status, url, signing_key, events, workspace_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(webhook.id)
        .bind(webhook.status.as_str())
        .bind(&webhook.url)
        .bind(&webhook.signing_key)
        .bind(Json(&webhook.events))
        .bind(webhook.workspace_id)
        .bind(webhook.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_webhook_by_id(&self, id: Uuid) -> Result<Option<Webhook>> {
        let row = sqlx::query(
            r#"SELECT id, status, url, signing_key, events, workspace_id, created_at FROM webhooks WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_webhook).transpose()
    }

    async fn find_webhook_by_event_type(
        &self,
        workspace_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<Webhook>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, url, signing_key, events, workspace_id, created_at
            FROM webhooks
            WHERE workspace_id = $1 AND status = $2 AND events @> $3
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(workspace_id)
        .bind(WebhookStatus::Active.as_str())
        .bind(Json(vec![event_type]))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_webhook).transpose()
    }

    async fn find_webhooks_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Webhook>> {
        let rows = sqlx::query(
            r#"SELECT id, status, url, signing_key, events, workspace_id, created_at FROM webhooks WHERE workspace_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_webhook).collect()
    }

    async fn save_log(&self, log: &WebhookDeliveryLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_logs (id, status, event_type, payload, retries, next_send_at, attempts, webhook_id, workspace_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                retries = EXCLUDED.retries,
                next_send_at = EXCLUDED.next_send_at,
                attempts = EXCLUDED.attempts,
                updated_at = NOW()
            "#,
        )
        .bind(log.id)
        .bind(log.status.as_str())
        .bind(log.event_type.as_str())
        .bind(&log.payload)
        .bind(log.retries)
        .bind(log.next_send_at)
        .bind(Json(&log.attempts))
        .bind(log.webhook_id)
        .bind(log.workspace_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due_log(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
    ) -> Result<Option<WebhookDeliveryLog>> {
        let row = sqlx::query(
            r#"
            UPDATE webhook_logs SET next_send_at = $3, updated_at = NOW()
            WHERE id = (
                SELECT id FROM webhook_logs
                WHERE status = 'FAILURE' AND retries < $2 AND next_send_at <= $1
                ORDER BY next_send_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, status, event_type, payload, retries, next_send_at, attempts, webhook_id, workspace_id
            "#,
        )
        .bind(now)
        .bind(max_retries)
        .bind(now + Duration::seconds(CLAIM_LEASE_SECS))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_log).transpose()
    }
}

#[async_trait]
impl MessageLookup for PgStore {
    async fn find_message_owner(&self, provider_message_id: &str) -> Result<Option<MessageOwner>> {
        let row = sqlx::query(
            r#"SELECT organization_id, workspace_id FROM emails WHERE message_id = $1"#,
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(MessageOwner {
                organization_id: row.try_get("organization_id")?,
                workspace_id: row.try_get("workspace_id")?,
            })),
            None => Ok(None),
        }
    }
}
