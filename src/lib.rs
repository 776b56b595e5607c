pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::Config;
use crate::database::{EventStore, MemoryStore, MessageLookup, PgStore, TopicStore, WebhookStore};
use crate::error::Result;
use crate::services::{
    event_bus::EventBus,
    event_service::EventService,
    rate_limit_service::{RateLimitStore, RateLimiter},
    signature_service::{CertificateCache, SignatureVerifier},
    topic_service::{TopicService, TopicTransport},
    webhook_service::WebhookService,
};

/// Persistence backends the services run against.
#[derive(Clone)]
pub struct Stores {
    pub topics: Arc<dyn TopicStore>,
    pub events: Arc<dyn EventStore>,
    pub messages: Arc<dyn MessageLookup>,
    pub webhooks: Arc<dyn WebhookStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            topics: store.clone(),
            events: store.clone(),
            messages: store.clone(),
            webhooks: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            topics: store.clone(),
            events: store.clone(),
            messages: store.clone(),
            webhooks: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub cert_cache: Arc<CertificateCache>,
    pub event_service: EventService,
    pub topic_service: Arc<TopicService>,
    pub webhook_service: WebhookService,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: &Config,
        stores: Stores,
        transport: Arc<dyn TopicTransport>,
        rate_limits: Box<dyn RateLimitStore>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);

        let bus = Arc::new(EventBus::new(config.event_queue_capacity));
        let cert_cache = Arc::new(CertificateCache::new());
        let verifier = Arc::new(SignatureVerifier::new(
            cert_cache.clone(),
            timeout,
            config.sns_cert_host_suffix.clone(),
        )?);

        let event_service = EventService::new(stores.events, stores.messages, bus.clone());
        let topic_service = TopicService::new(
            stores.topics,
            transport,
            verifier,
            event_service.clone(),
            config.sns_endpoint(),
            timeout,
        )?;
        let webhook_service =
            WebhookService::new(stores.webhooks, timeout, config.webhook_max_retries)?;
        let rate_limiter = RateLimiter::from_config(rate_limits, config);

        Ok(Self {
            bus,
            cert_cache,
            event_service,
            topic_service: Arc::new(topic_service),
            webhook_service,
            rate_limiter: Arc::new(rate_limiter),
        })
    }
}
