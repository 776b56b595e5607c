use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sns::config::{BehaviorVersion, Credentials, Region as AwsRegion};
use aws_sdk_sns::error::DisplayErrorContext;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::APP_NAME;
use crate::database::TopicStore;
use crate::dto::sns_dto::{SesNotificationMessage, SnsEnvelope};
use crate::error::{Error, Result};
use crate::models::notification_topic::{NotificationTopic, Region, TopicStatus, SUPPORTED_REGIONS};
use crate::services::event_service::EventService;
use crate::services::signature_service::SignatureVerifier;

/// Message the transport sends once a topic is wired to mail event publishing.
pub const TOPIC_VALIDATED_MESSAGE: &str =
    "Successfully validated SNS topic for Amazon SES event publishing.";

/// Number of `:`-separated fields in a topic identifier.
const TOPIC_ARN_FIELDS: usize = 6;

pub fn topic_name() -> String {
    format!("ses-{}", APP_NAME)
}

/// Channel management on the notification transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TopicTransport: Send + Sync {
    fn regions(&self) -> Vec<Region>;
    async fn create_topic(&self, region: Region, name: &str) -> Result<String>;
    async fn subscribe(&self, region: Region, topic_arn: &str, endpoint: &str) -> Result<()>;
}

pub struct SnsTransport {
    clients: HashMap<Region, aws_sdk_sns::Client>,
}

impl SnsTransport {
    pub async fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        let mut clients = HashMap::new();
        for region in SUPPORTED_REGIONS {
            let credentials =
                Credentials::new(access_key_id, secret_access_key, None, None, "mailhook-static");
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(AwsRegion::new(region.as_str()))
                .credentials_provider(credentials)
                .load()
                .await;
            clients.insert(region, aws_sdk_sns::Client::new(&config));
        }
        Self { clients }
    }

    fn client(&self, region: Region) -> Result<&aws_sdk_sns::Client> {
        self.clients
            .get(&region)
            .ok_or_else(|| Error::TransportUnavailable(region.to_string()))
    }
}

#[async_trait]
impl TopicTransport for SnsTransport {
    fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.clients.keys().copied().collect();
        regions.sort();
        regions
    }

    async fn create_topic(&self, region: Region, name: &str) -> Result<String> {
        let output = self
            .client(region)?
            .create_topic()
            .name(name)
            .attributes("FifoTopic", "false")
            .send()
            .await
            .map_err(|e| Error::Transport(DisplayErrorContext(&e).to_string()))?;
        output
            .topic_arn()
            .map(str::to_string)
            .ok_or_else(|| Error::Transport("create topic returned no arn".to_string()))
    }

    async fn subscribe(&self, region: Region, topic_arn: &str, endpoint: &str) -> Result<()> {
        self.client(region)?
            .subscribe()
            .protocol("https")
            .topic_arn(topic_arn)
            .endpoint(endpoint)
            .send()
            .await
            .map_err(|e| Error::Transport(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// Region of a topic identifier such as `arn:aws:sns:us-east-1:123456789012:name`.
pub fn region_from_arn(arn: &str) -> Result<Region> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() != TOPIC_ARN_FIELDS || parts[0] != "arn" {
        return Err(Error::InvalidTopic(format!("malformed topic identifier: {}", arn)));
    }
    parts[3].parse().map_err(Error::InvalidTopic)
}

pub struct TopicService {
    store: Arc<dyn TopicStore>,
    transport: Arc<dyn TopicTransport>,
    verifier: Arc<SignatureVerifier>,
    events: EventService,
    client: Client,
    endpoint: String,
    topics: RwLock<HashMap<Region, NotificationTopic>>,
}

impl TopicService {
    pub fn new(
        store: Arc<dyn TopicStore>,
        transport: Arc<dyn TopicTransport>,
        verifier: Arc<SignatureVerifier>,
        events: EventService,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            transport,
            verifier,
            events,
            client,
            endpoint,
            topics: RwLock::new(HashMap::new()),
        })
    }

    /// Snapshot of the live (PENDING or ACTIVE) topic per region.
    pub async fn topics(&self) -> HashMap<Region, NotificationTopic> {
        self.topics.read().await.clone()
    }

    /// Ensures every region has one topic and that pending topics have a
    /// subscription request in flight. Safe to run repeatedly.
    pub async fn setup_topics(&self) -> Result<()> {
        info!("setting up notification topics");
        let existing = self.store.find_all_topics().await?;
        let mut live = HashMap::new();

        for region in self.transport.regions() {
            if let Some(topic) = existing.iter().find(|t| t.region == region) {
                if topic.status == TopicStatus::Inactive {
                    warn!(region = %region, topic_arn = %topic.arn, "topic is inactive, leaving region unsubscribed");
                } else {
                    info!(region = %region, topic_arn = %topic.arn, "found topic");
                    live.insert(region, topic.clone());
                }
                continue;
            }

            info!(region = %region, "creating topic");
            let arn = self.transport.create_topic(region, &topic_name()).await?;
            let topic = NotificationTopic::pending(region, arn);
            self.store.save_topic(&topic).await?;
            live.insert(region, topic);
        }

        let pending: Vec<NotificationTopic> = live
            .values()
            .filter(|t| t.status == TopicStatus::Pending)
            .cloned()
            .collect();
        *self.topics.write().await = live;

        for topic in pending {
            info!(region = %topic.region, topic_arn = %topic.arn, "subscribing to topic");
            self.transport
                .subscribe(topic.region, &topic.arn, &self.endpoint)
                .await?;
        }
        info!("notification topics setup complete");
        Ok(())
    }

    pub async fn confirm_subscribe(&self, payload: &[u8]) -> Result<()> {
        let (region, envelope) = self.verified_envelope(payload).await?;
        let url = envelope
            .subscribe_url
            .as_deref()
            .ok_or_else(|| Error::BadRequest("missing SubscribeURL".to_string()))?;

        let mut topic = self
            .transitionable_topic(region, &envelope.topic_arn, TopicStatus::Active)
            .await?;

        info!(region = %region, "confirming subscription");
        self.follow_confirmation_url(url).await?;
        self.store
            .update_topic_status(region, TopicStatus::Active)
            .await
            .inspect_err(|err| error!(region = %region, error = %err, "failed to update topic status"))?;

        topic.status = TopicStatus::Active;
        self.topics.write().await.insert(region, topic);
        info!(region = %region, "subscription confirmed");
        Ok(())
    }

    pub async fn confirm_unsubscribe(&self, payload: &[u8]) -> Result<()> {
        let (region, envelope) = self.verified_envelope(payload).await?;
        let url = envelope
            .unsubscribe_url
            .as_deref()
            .ok_or_else(|| Error::BadRequest("missing UnsubscribeURL".to_string()))?;

        self.transitionable_topic(region, &envelope.topic_arn, TopicStatus::Inactive)
            .await?;

        info!(region = %region, "confirming unsubscription");
        self.follow_confirmation_url(url).await?;
        self.store
            .update_topic_status(region, TopicStatus::Inactive)
            .await
            .inspect_err(|err| error!(region = %region, error = %err, "failed to update topic status"))?;
        self.topics.write().await.remove(&region);
        info!(region = %region, "topic deactivated");
        Ok(())
    }

    pub async fn process_notification(&self, payload: &[u8]) -> Result<()> {
        let (_, envelope) = self.verified_envelope(payload).await?;
        if envelope.message == TOPIC_VALIDATED_MESSAGE {
            info!(topic_arn = %envelope.topic_arn, "{}", envelope.message);
            return Ok(());
        }

        let raw: JsonValue = serde_json::from_str(&envelope.message).inspect_err(|err| {
            warn!(message_id = %envelope.message_id, error = %err, "notification message is not JSON")
        })?;
        let message: SesNotificationMessage = serde_json::from_value(raw.clone())?;
        self.events.create_from_notification(message, raw).await?;
        Ok(())
    }

    async fn verified_envelope(&self, payload: &[u8]) -> Result<(Region, SnsEnvelope)> {
        let envelope: SnsEnvelope = serde_json::from_slice(payload)
            .map_err(|e| Error::BadRequest(format!("invalid notification payload: {}", e)))?;
        self.verifier.verify(&envelope).await?;
        let region = region_from_arn(&envelope.topic_arn)?;

        if let Some(known) = self.topics.read().await.get(&region) {
            if known.arn != envelope.topic_arn {
                return Err(Error::InvalidTopic(format!(
                    "topic {} is not registered for region {}",
                    envelope.topic_arn, region
                )));
            }
        }
        Ok((region, envelope))
    }

    async fn follow_confirmation_url(&self, url: &str) -> Result<()> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "confirmation url returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// The persisted topic of `region`, provided it is `topic_arn` and may
    /// move to `next`. Checked before any confirmation URL is followed.
    async fn transitionable_topic(
        &self,
        region: Region,
        topic_arn: &str,
        next: TopicStatus,
    ) -> Result<NotificationTopic> {
        let topic = self
            .store
            .find_all_topics()
            .await?
            .into_iter()
            .find(|t| t.region == region)
            .ok_or_else(|| Error::InvalidTopic(format!("no topic registered for region {}", region)))?;
        if topic.arn != topic_arn {
            return Err(Error::InvalidTopic(format!(
                "topic {} is not registered for region {}",
                topic_arn, region
            )));
        }
        if !topic.status.can_transition_to(next) {
            warn!(region = %region, status = topic.status.as_str(), next = next.as_str(), "refusing topic transition");
            return Err(Error::InvalidTopic(format!(
                "topic for region {} cannot move from {} to {}",
                region,
                topic.status.as_str(),
                next.as_str()
            )));
        }
        Ok(topic)
    }
}
