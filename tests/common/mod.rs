#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mailhook_backend::{
    config::Config,
    database::{MemoryStore, MessageOwner},
    dto::sns_dto::SnsEnvelope,
    error::Result,
    models::notification_topic::{Region, SUPPORTED_REGIONS},
    services::{
        rate_limit_service::MemoryRateLimitStore,
        signature_service::{canonical_string, parse_certificate_pem},
        topic_service::TopicTransport,
    },
    AppState, Stores,
};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use uuid::Uuid;

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/sns_signing_key.pem");
pub const SIGNING_CERT_PEM: &str = include_str!("../fixtures/sns_signing_cert.pem");
pub const CERT_URL: &str = "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-test.pem";
pub const ACCOUNT_ID: &str = "123456789012";

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        database_url: "postgres://unused".into(),
        redis_url: "redis://unused".into(),
        public_host: "https://hooks.example.com".into(),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        otp_generate_rate_limit: 3,
        otp_generate_rate_limit_window: 7200,
        otp_verify_rate_limit: 5,
        otp_verify_rate_limit_window: 86400,
        http_timeout_secs: 5,
        event_queue_capacity: 16,
        listener_workers: 2,
        sns_cert_host_suffix: None,
        webhook_redelivery_interval_secs: 1,
        webhook_max_retries: 5,
    }
}

pub fn signing_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(SIGNING_KEY_PEM).expect("fixture private key")
}

pub fn certificate_key() -> RsaPublicKey {
    parse_certificate_pem(SIGNING_CERT_PEM.as_bytes()).expect("fixture certificate")
}

pub fn topic_arn(region: Region) -> String {
    format!("arn:aws:sns:{}:{}:ses-mailhook", region, ACCOUNT_ID)
}

pub fn envelope(message_type: &str, topic_arn: &str, message: &str) -> SnsEnvelope {
    SnsEnvelope {
        message_type: message_type.into(),
        message_id: Uuid::new_v4().to_string(),
        topic_arn: topic_arn.into(),
        message: message.into(),
        signature: String::new(),
        signature_version: "1".into(),
        timestamp: "2024-05-01T12:00:00.000Z".into(),
        signing_cert_url: CERT_URL.into(),
        subject: None,
        token: None,
        subscribe_url: None,
        unsubscribe_url: None,
    }
}

/// Signs the envelope the way the transport does (SHA-1 / RSA PKCS#1 v1.5).
pub fn sign(envelope: &mut SnsEnvelope) {
    let key = SigningKey::<sha1::Sha1>::new(signing_key());
    let signature = key.sign(&canonical_string(envelope));
    envelope.signature = STANDARD.encode(signature.to_bytes());
}

pub fn signed_body(mut envelope: SnsEnvelope) -> Vec<u8> {
    sign(&mut envelope);
    serde_json::to_vec(&envelope).expect("serialize envelope")
}

#[derive(Default)]
pub struct FakeTransport {
    pub created: Mutex<Vec<Region>>,
    pub subscribed: Mutex<Vec<(Region, String, String)>>,
}

impl FakeTransport {
    pub fn created(&self) -> Vec<Region> {
        self.created.lock().unwrap().clone()
    }

    pub fn subscribed(&self) -> Vec<(Region, String, String)> {
        self.subscribed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TopicTransport for FakeTransport {
    fn regions(&self) -> Vec<Region> {
        SUPPORTED_REGIONS.to_vec()
    }

    async fn create_topic(&self, region: Region, name: &str) -> Result<String> {
        self.created.lock().unwrap().push(region);
        Ok(format!("arn:aws:sns:{}:{}:{}", region, ACCOUNT_ID, name))
    }

    async fn subscribe(&self, region: Region, topic_arn: &str, endpoint: &str) -> Result<()> {
        self.subscribed
            .lock()
            .unwrap()
            .push((region, topic_arn.to_string(), endpoint.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<FakeTransport>,
}

impl TestApp {
    /// App wired to in-memory stores with the fixture certificate already cached.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(FakeTransport::default());
        let state = AppState::new(
            &test_config(),
            Stores::memory(store.clone()),
            transport.clone(),
            Box::new(MemoryRateLimitStore::new()),
        )
        .expect("app state");
        state
            .cert_cache
            .insert(CERT_URL, certificate_key())
            .await
            .expect("seed certificate cache");
        Self {
            state,
            store,
            transport,
        }
    }

    pub fn owner(&self, provider_message_id: &str) -> MessageOwner {
        let owner = MessageOwner {
            organization_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
        };
        self.store.register_message(provider_message_id, owner);
        owner
    }
}

pub fn bounce_message(provider_message_id: &str) -> String {
    serde_json::json!({
        "eventType": "Bounce",
        "bounce": { "bounceType": "Permanent" },
        "mail": {
            "messageId": provider_message_id,
            "source": "sender@example.com",
            "timestamp": "2024-05-01T12:00:00.000Z",
            "destination": ["to@example.com"],
            "commonHeaders": {
                "from": ["sender@example.com"],
                "to": ["to@example.com"],
                "cc": ["cc@example.com"]
            }
        }
    })
    .to_string()
}
