//! Sliding-window rate limiting over a sorted set of hit timestamps.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::utils::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    OtpGenerate,
    OtpVerify,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::OtpGenerate => "OTP_GENERATE",
            RateLimitKind::OtpVerify => "OTP_VERIFY",
        }
    }
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which hits for `identifier` are counted.
pub fn rate_limit_key(kind: RateLimitKind, identifier: &str) -> String {
    format!("{}_{}", kind.as_str(), identifier).to_lowercase()
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Drops hits older than `window`, records one at `now_ms` and returns the
    /// number of hits left in the window, all in one atomic step.
    async fn record(&self, key: &str, now_ms: i64, window: Duration) -> Result<usize>;
    async fn clear(&self, key: &str) -> Result<()>;
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

/// MULTI/EXEC of trim, add, count and expire. Only the count is returned.
fn window_pipeline(key: &str, member: &str, now_ms: i64, window_ms: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .zrembyscore(key, 0, now_ms.saturating_sub(window_ms))
        .ignore()
        .zadd(key, member, now_ms)
        .ignore()
        .zcard(key)
        .pexpire(key, window_ms)
        .ignore();
    pipe
}

#[derive(Clone)]
pub struct RedisRateLimitStore {
    client: Client,
}

impl RedisRateLimitStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        info!("Redis client created");
        Ok(Self { client })
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn record(&self, key: &str, now_ms: i64, window: Duration) -> Result<usize> {
        let mut conn = self.get_conn().await?;
        let window_ms = window_millis(window);
        // Two hits in the same millisecond must stay distinct set members.
        let member = format!("{}-{:016x}", now_ms, rand::thread_rng().gen::<u64>());

        let (count,): (usize,) = window_pipeline(key, &member, now_ms, window_ms)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// In-process store with the same window semantics as the Redis one.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    hits: Mutex<HashMap<String, Vec<i64>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn record(&self, key: &str, now_ms: i64, window: Duration) -> Result<usize> {
        let cutoff = now_ms.saturating_sub(window_millis(window));
        let mut hits = self.hits.lock().await;
        let entry = hits.entry(key.to_string()).or_default();
        entry.retain(|&at| at > cutoff);
        entry.push(now_ms);
        Ok(entry.len())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.hits.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: usize,
    pub window: Duration,
}

pub struct RateLimiter {
    store: Box<dyn RateLimitStore>,
    policies: HashMap<RateLimitKind, RateLimitPolicy>,
}

impl RateLimiter {
    pub fn new(store: Box<dyn RateLimitStore>) -> Self {
        Self {
            store,
            policies: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, kind: RateLimitKind, limit: usize, window: Duration) -> Self {
        self.policies.insert(kind, RateLimitPolicy { limit, window });
        self
    }

    pub fn from_config(store: Box<dyn RateLimitStore>, config: &Config) -> Self {
        Self::new(store)
            .with_policy(
                RateLimitKind::OtpGenerate,
                config.otp_generate_rate_limit,
                Duration::from_secs(config.otp_generate_rate_limit_window),
            )
            .with_policy(
                RateLimitKind::OtpVerify,
                config.otp_verify_rate_limit,
                Duration::from_secs(config.otp_verify_rate_limit_window),
            )
    }

    pub fn policy(&self, kind: RateLimitKind) -> Option<RateLimitPolicy> {
        self.policies.get(&kind).copied()
    }

    /// Records a hit and reports whether it is within the limit. Hits over the
    /// limit are still recorded. Kinds without a policy are always allowed.
    pub async fn evaluate(&self, kind: RateLimitKind, identifier: &str) -> Result<bool> {
        let Some(policy) = self.policy(kind) else {
            warn!(kind = %kind, "no rate limit policy configured");
            return Ok(true);
        };
        let key = rate_limit_key(kind, identifier);
        let now_ms = time::now().timestamp_millis();
        let count = self.store.record(&key, now_ms, policy.window).await?;
        let allowed = count <= policy.limit;
        debug!(key = %key, count, limit = policy.limit, allowed, "rate limit evaluated");
        Ok(allowed)
    }

    pub async fn reset(&self, kind: RateLimitKind, identifier: &str) -> Result<()> {
        self.store.clear(&rate_limit_key(kind, identifier)).await
    }
}
