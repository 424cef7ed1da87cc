//! Redis-backed fixed-window limiter shared by every instance.

use async_trait::async_trait;
use tracing::warn;

use crate::cache::error::CacheResult;
use crate::cache::keys::ratelimit::RateLimitKey;
use crate::cache::RedisPool;
use crate::services::rate_limiter::{RateLimitDecision, RateLimitPolicy, RateLimiter};

#[derive(Clone)]
pub struct RedisRateLimiter {
    pool: RedisPool,
}

impl RedisRateLimiter {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// INCR the window counter, start its expiry on first use, read the TTL.
    async fn count(&self, key: &str, window_secs: u64) -> CacheResult<(u32, i64)> {
        let mut conn = self.pool.get().await?;
        let (count, ttl): (u32, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .arg("NX")
            .ignore()
            .cmd("TTL")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok((count, ttl))
    }
}

/// Turn a counter reading into a decision.
pub fn decide(count: u32, ttl_secs: i64, policy: &RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
    let window_secs = policy.window.as_secs() as i64;
    let remaining_secs = if ttl_secs > 0 { ttl_secs } else { window_secs };
    let reset_at = now_ms / 1000 + remaining_secs;

    if count > policy.max_requests {
        RateLimitDecision {
            allowed: false,
            limit: policy.max_requests,
            remaining: 0,
            reset_at,
            retry_after: Some(remaining_secs.max(1) as u64),
        }
    } else {
        RateLimitDecision {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests - count,
            reset_at,
            retry_after: None,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, client: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        let key = RateLimitKey::new(policy.scope.as_str(), client).to_string();
        let now_ms = chrono::Utc::now().timestamp_millis();

        match self.count(&key, policy.window.as_secs().max(1)).await {
            Ok((count, ttl)) => decide(count, ttl, policy, now_ms),
            Err(e) => {
                warn!(key = %key, error = %e, "rate limit store unavailable, allowing request");
                RateLimitDecision::fail_open(policy, now_ms)
            }
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
