//! Authenticity checks for notifications pushed by the transport.
//!
//! The transport signs a newline-delimited canonical form of the envelope with
//! the key of an X.509 certificate published at `SigningCertURL`. Certificates
//! are fetched once per normalized URL and kept for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::dto::sns_dto::SnsEnvelope;
use crate::error::{Error, Result};
use crate::utils::http::{read_capped, MAX_BODY_BYTES};

/// Signing certificates keyed by normalized URL. Entries are never evicted.
#[derive(Default)]
pub struct CertificateCache {
    keys: RwLock<HashMap<String, RsaPublicKey>>,
}

impl CertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<RsaPublicKey> {
        let key = normalize_cert_url(url).ok()?;
        self.keys.read().await.get(&key).cloned()
    }

    pub async fn insert(&self, url: &str, public_key: RsaPublicKey) -> Result<()> {
        let key = normalize_cert_url(url)?;
        self.keys.write().await.entry(key).or_insert(public_key);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

pub fn normalize_cert_url(raw: &str) -> Result<String> {
    Url::parse(raw)
        .map(|u| u.to_string())
        .map_err(|e| Error::InvalidSignature(format!("invalid signing certificate url: {}", e)))
}

/// Byte string the transport signs: each present field name and value, each
/// followed by a newline, in this fixed order.
pub fn canonical_string(envelope: &SnsEnvelope) -> Vec<u8> {
    let fields: [(&str, Option<&str>); 8] = [
        ("Message", Some(envelope.message.as_str())),
        ("MessageId", Some(envelope.message_id.as_str())),
        ("Subject", envelope.subject.as_deref()),
        ("SubscribeURL", envelope.subscribe_url.as_deref()),
        ("Timestamp", Some(envelope.timestamp.as_str())),
        ("Token", envelope.token.as_deref()),
        ("TopicArn", Some(envelope.topic_arn.as_str())),
        ("Type", Some(envelope.message_type.as_str())),
    ];

    let mut out = Vec::new();
    for (name, value) in fields {
        if let Some(value) = value {
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
    }
    out
}

/// Extracts the RSA public key from a PEM-encoded X.509 certificate.
pub fn parse_certificate_pem(pem: &[u8]) -> Result<RsaPublicKey> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| Error::InvalidSignature(format!("invalid PEM: {}", e)))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| Error::InvalidSignature(format!("invalid certificate: {}", e)))?;
    RsaPublicKey::from_public_key_der(cert.public_key().raw)
        .map_err(|e| Error::InvalidSignature(format!("unsupported certificate key: {}", e)))
}

pub struct SignatureVerifier {
    client: Client,
    cache: Arc<CertificateCache>,
    trusted_host_suffix: Option<String>,
}

impl SignatureVerifier {
    pub fn new(
        cache: Arc<CertificateCache>,
        timeout: Duration,
        trusted_host_suffix: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            cache,
            trusted_host_suffix,
        })
    }

    pub fn cache(&self) -> &Arc<CertificateCache> {
        &self.cache
    }

    pub async fn verify(&self, envelope: &SnsEnvelope) -> Result<()> {
        debug!(message_id = %envelope.message_id, "verifying notification signature");
        let public_key = self.signing_key(&envelope.signing_cert_url).await?;
        let raw = STANDARD
            .decode(envelope.signature.trim())
            .map_err(|e| Error::InvalidSignature(format!("signature is not base64: {}", e)))?;
        let signature = Signature::try_from(raw.as_slice())
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let content = canonical_string(envelope);

        let verified = match envelope.signature_version.as_str() {
            "" | "1" => VerifyingKey::<sha1::Sha1>::new(public_key).verify(&content, &signature),
            "2" => VerifyingKey::<sha2::Sha256>::new(public_key).verify(&content, &signature),
            other => {
                return Err(Error::InvalidSignature(format!(
                    "unsupported signature version {}",
                    other
                )))
            }
        };

        verified.map_err(|_| {
            warn!(message_id = %envelope.message_id, topic_arn = %envelope.topic_arn, "signature mismatch");
            Error::InvalidSignature("signature does not match".to_string())
        })
    }

    async fn signing_key(&self, cert_url: &str) -> Result<RsaPublicKey> {
        if let Some(key) = self.cache.get(cert_url).await {
            debug!(cert_url, "signing certificate found in cache");
            return Ok(key);
        }

        self.check_cert_url(cert_url)?;
        info!(cert_url, "fetching signing certificate");
        let resp = self
            .client
            .get(cert_url)
            .send()
            .await
            .map_err(|e| Error::InvalidSignature(format!("certificate fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::InvalidSignature(format!(
                "certificate fetch returned {}",
                resp.status()
            )));
        }
        let (body, truncated) = read_capped(resp, MAX_BODY_BYTES)
            .await
            .map_err(|e| Error::InvalidSignature(format!("certificate read failed: {}", e)))?;
        if truncated {
            return Err(Error::InvalidSignature(format!(
                "certificate larger than {} bytes",
                MAX_BODY_BYTES
            )));
        }
        let key = parse_certificate_pem(&body)?;
        self.cache.insert(cert_url, key.clone()).await?;
        info!(cert_url, "signing certificate cached");
        Ok(key)
    }

    fn check_cert_url(&self, cert_url: &str) -> Result<()> {
        let Some(suffix) = self.trusted_host_suffix.as_deref() else {
            return Ok(());
        };
        let url = Url::parse(cert_url)
            .map_err(|e| Error::InvalidSignature(format!("invalid signing certificate url: {}", e)))?;
        let host = url.host_str().unwrap_or_default();
        if url.scheme() != "https" || !is_sns_host(host, suffix) {
            return Err(Error::InvalidSignature(format!(
                "untrusted signing certificate host: {}",
                host
            )));
        }
        Ok(())
    }
}

/// Whether `host` is `sns.<region><suffix>` (or the `.cn` partition of it).
/// Any other host under the suffix, such as an S3 bucket, is not trusted.
fn is_sns_host(host: &str, suffix: &str) -> bool {
    let cn_suffix = format!("{}.cn", suffix);
    let Some(rest) = host
        .strip_suffix(cn_suffix.as_str())
        .or_else(|| host.strip_suffix(suffix))
    else {
        return false;
    };
    let Some(region) = rest.strip_prefix("sns.") else {
        return false;
    };
    !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
