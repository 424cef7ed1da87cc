//! Fixed-window, per-client rate limiting.
//!
//! Handlers depend on the [`RateLimiter`] trait. [`InMemoryRateLimiter`]
//! serves single-instance deployments and is swept by a background worker;
//! the Redis-backed limiter in `cache::rate_limit` is shared across instances.

use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::RateLimitSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Checkout,
    Orders,
    Webhook,
    Api,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Checkout => "checkout",
            RateLimitScope::Orders => "orders",
            RateLimitScope::Webhook => "webhook",
            RateLimitScope::Api => "api",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub scope: RateLimitScope,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(scope: RateLimitScope, max_requests: u32, window: Duration) -> Self {
        Self {
            scope,
            max_requests,
            window,
        }
    }

    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Per-route policies built from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicies {
    pub checkout: RateLimitPolicy,
    pub orders: RateLimitPolicy,
    pub webhook: RateLimitPolicy,
    pub api: RateLimitPolicy,
}

impl RateLimitPolicies {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let window = Duration::from_secs(settings.window_secs);
        Self {
            checkout: RateLimitPolicy::new(RateLimitScope::Checkout, settings.checkout, window),
            orders: RateLimitPolicy::new(RateLimitScope::Orders, settings.orders, window),
            webhook: RateLimitPolicy::new(RateLimitScope::Webhook, settings.webhook, window),
            api: RateLimitPolicy::new(RateLimitScope::Api, settings.api, window),
        }
    }
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the current window ends
    pub reset_at: i64,
    /// Whole seconds to wait; only set when the request was refused
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Decision used when the backing store is unavailable.
    pub fn fail_open(policy: &RateLimitPolicy, now_ms: i64) -> Self {
        Self {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_at: (now_ms + policy.window_ms()) / 1000,
            retry_after: None,
        }
    }
}

fn ceil_secs(ms: i64) -> u64 {
    (ms.max(0) as u64).div_ceil(1000)
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request from `client` against `policy`.
    async fn check(&self, client: &str, policy: &RateLimitPolicy) -> RateLimitDecision;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(client: &str, policy: &RateLimitPolicy) -> String {
        format!("{}:{}", policy.scope, client)
    }

    /// Clock-explicit variant of [`RateLimiter::check`].
    pub fn check_at(&self, client: &str, policy: &RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        let mut entry = self
            .windows
            .entry(Self::key(client, policy))
            .or_insert(Window {
                count: 0,
                reset_at_ms: now_ms + policy.window_ms(),
            });
        let window = entry.value_mut();

        if now_ms > window.reset_at_ms {
            *window = Window {
                count: 0,
                reset_at_ms: now_ms + policy.window_ms(),
            };
        }

        if window.count >= policy.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at: window.reset_at_ms / 1000,
                retry_after: Some(ceil_secs(window.reset_at_ms - now_ms).max(1)),
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests - window.count,
            reset_at: window.reset_at_ms / 1000,
            retry_after: None,
        }
    }

    /// Drop windows that ended before `now_ms`. Returns how many were removed.
    pub fn sweep_at(&self, now_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at_ms >= now_ms);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, remaining = self.windows.len(), "swept expired rate limit windows");
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, client: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.check_at(client, policy, chrono::Utc::now().timestamp_millis())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Client address: `x-real-ip`, else the first `x-forwarded-for` entry,
/// else `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
