mod common;

use std::sync::Arc;
use std::time::Duration;

use common::test_config;
use mailhook_backend::services::rate_limit_service::{
    MemoryRateLimitStore, RateLimitKind, RateLimiter, RedisRateLimitStore,
};

fn limiter() -> RateLimiter {
    RateLimiter::from_config(Box::new(MemoryRateLimitStore::new()), &test_config())
}

#[tokio::test]
async fn fourth_generate_call_in_window_is_refused() {
    let limiter = limiter();
    for _ in 0..3 {
        assert!(limiter
            .evaluate(RateLimitKind::OtpGenerate, "user@example.com")
            .await
            .unwrap());
    }
    assert!(!limiter
        .evaluate(RateLimitKind::OtpGenerate, "user@example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn kinds_and_identifiers_are_counted_separately() {
    let limiter = limiter();
    for _ in 0..3 {
        limiter
            .evaluate(RateLimitKind::OtpGenerate, "10.0.0.1")
            .await
            .unwrap();
    }
    assert!(limiter
        .evaluate(RateLimitKind::OtpVerify, "10.0.0.1")
        .await
        .unwrap());
    assert!(limiter
        .evaluate(RateLimitKind::OtpGenerate, "10.0.0.2")
        .await
        .unwrap());
}

#[tokio::test]
async fn identifiers_are_case_insensitive() {
    let limiter = limiter();
    for _ in 0..3 {
        limiter
            .evaluate(RateLimitKind::OtpGenerate, "Ops@Example.com")
            .await
            .unwrap();
    }
    assert!(!limiter
        .evaluate(RateLimitKind::OtpGenerate, "ops@example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn reset_clears_the_window() {
    let limiter = limiter();
    for _ in 0..4 {
        limiter
            .evaluate(RateLimitKind::OtpGenerate, "User@Example.com")
            .await
            .unwrap();
    }
    limiter
        .reset(RateLimitKind::OtpGenerate, "user@example.com")
        .await
        .unwrap();
    assert!(limiter
        .evaluate(RateLimitKind::OtpGenerate, "user@example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn hits_expire_when_the_window_slides() {
    let limiter = RateLimiter::new(Box::new(MemoryRateLimitStore::new())).with_policy(
        RateLimitKind::OtpVerify,
        1,
        Duration::from_millis(50),
    );
    assert!(limiter.evaluate(RateLimitKind::OtpVerify, "a").await.unwrap());
    assert!(!limiter.evaluate(RateLimitKind::OtpVerify, "a").await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(limiter.evaluate(RateLimitKind::OtpVerify, "a").await.unwrap());
}

#[tokio::test]
async fn concurrent_callers_never_exceed_the_limit() {
    let limiter = Arc::new(limiter());
    let mut handles = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .evaluate(RateLimitKind::OtpVerify, "shared")
                .await
                .unwrap()
        }));
    }
    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

/// Needs a reachable Redis: `REDIS_URL=redis://127.0.0.1 cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn redis_store_counts_and_resets_a_window() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    let store = RedisRateLimitStore::new(&url).expect("redis client");
    let identifier = format!("{}@example.com", uuid::Uuid::new_v4());
    let limiter = RateLimiter::new(Box::new(store)).with_policy(
        RateLimitKind::OtpGenerate,
        3,
        Duration::from_secs(7200),
    );

    for _ in 0..3 {
        assert!(limiter
            .evaluate(RateLimitKind::OtpGenerate, &identifier)
            .await
            .unwrap());
    }
    assert!(!limiter
        .evaluate(RateLimitKind::OtpGenerate, &identifier)
        .await
        .unwrap());

    limiter
        .reset(RateLimitKind::OtpGenerate, &identifier)
        .await
        .unwrap();
    assert!(limiter
        .evaluate(RateLimitKind::OtpGenerate, &identifier)
        .await
        .unwrap());
    limiter
        .reset(RateLimitKind::OtpGenerate, &identifier)
        .await
        .unwrap();
}
