mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use mailhook_backend::{
    error::Error,
    models::notification_topic::Region,
    services::signature_service::{CertificateCache, SignatureVerifier},
    utils::http::MAX_BODY_BYTES,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn verifier(cache: Arc<CertificateCache>, suffix: Option<&str>) -> SignatureVerifier {
    SignatureVerifier::new(cache, Duration::from_secs(5), suffix.map(str::to_string))
        .expect("verifier")
}

#[tokio::test]
async fn valid_signature_is_accepted_and_tampering_is_rejected() {
    let cache = Arc::new(CertificateCache::new());
    cache.insert(CERT_URL, certificate_key()).await.unwrap();
    let verifier = verifier(cache, None);

    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), "{\"hello\":1}");
    sign(&mut env);
    verifier.verify(&env).await.expect("signature verifies");

    let mut tampered = env.clone();
    tampered.message = "{\"hello\":2}".into();
    assert!(matches!(
        verifier.verify(&tampered).await,
        Err(Error::InvalidSignature(_))
    ));

    let mut tampered = env.clone();
    tampered.subject = Some("injected".into());
    assert!(matches!(
        verifier.verify(&tampered).await,
        Err(Error::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn optional_fields_are_part_of_the_signed_content() {
    let cache = Arc::new(CertificateCache::new());
    cache.insert(CERT_URL, certificate_key()).await.unwrap();
    let verifier = verifier(cache, None);

    let mut env = envelope(
        "SubscriptionConfirmation",
        &topic_arn(Region::EuWest1),
        "You have chosen to subscribe",
    );
    env.token = Some("token-1".into());
    env.subscribe_url = Some("https://sns.eu-west-1.amazonaws.com/?Action=ConfirmSubscription".into());
    sign(&mut env);
    verifier.verify(&env).await.expect("signature verifies");

    env.token = Some("token-2".into());
    assert!(verifier.verify(&env).await.is_err());
}

#[tokio::test]
async fn certificate_is_fetched_once_and_then_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cert.pem"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIGNING_CERT_PEM))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(CertificateCache::new());
    let verifier = verifier(cache.clone(), None);

    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), "first");
    env.signing_cert_url = format!("{}/cert.pem", server.uri());
    sign(&mut env);
    verifier.verify(&env).await.expect("first verification");

    let mut second = env.clone();
    second.message = "second".into();
    sign(&mut second);
    verifier.verify(&second).await.expect("second verification");

    assert_eq!(cache.len().await, 1);
    server.verify().await;
}

#[tokio::test]
async fn untrusted_certificate_host_is_never_contacted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIGNING_CERT_PEM))
        .expect(0)
        .mount(&server)
        .await;

    let verifier = verifier(Arc::new(CertificateCache::new()), Some(".amazonaws.com"));
    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), "hello");
    env.signing_cert_url = format!("{}/cert.pem", server.uri());
    sign(&mut env);

    assert!(matches!(
        verifier.verify(&env).await,
        Err(Error::InvalidSignature(_))
    ));
    server.verify().await;
}

#[tokio::test]
async fn unknown_signature_version_is_rejected() {
    let cache = Arc::new(CertificateCache::new());
    cache.insert(CERT_URL, certificate_key()).await.unwrap();
    let verifier = verifier(cache, None);

    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), "hello");
    env.signature_version = "3".into();
    sign(&mut env);
    assert!(matches!(
        verifier.verify(&env).await,
        Err(Error::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn oversized_certificate_is_rejected_and_not_cached() {
    let server = MockServer::start().await;
    let mut padded = SIGNING_CERT_PEM.as_bytes().to_vec();
    padded.resize(MAX_BODY_BYTES + 1, b'\n');
    Mock::given(method("GET"))
        .and(path("/cert.pem"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(padded))
        .mount(&server)
        .await;

    let cache = Arc::new(CertificateCache::new());
    let verifier = verifier(cache.clone(), None);
    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), "hello");
    env.signing_cert_url = format!("{}/cert.pem", server.uri());
    sign(&mut env);

    assert!(matches!(
        verifier.verify(&env).await,
        Err(Error::InvalidSignature(_))
    ));
    assert!(cache.is_empty().await);
}
