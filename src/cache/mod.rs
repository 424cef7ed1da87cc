//! Redis connection pool for state shared between instances
//!
//! Only the rate limiter uses Redis. When the pool cannot be built the
//! service keeps running with per-instance limits.

pub mod error;
pub mod keys;
pub mod rate_limit;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cache::error::{CacheError, CacheResult};

/// Redis connection pool type alias
pub type RedisPool = Pool<RedisConnectionManager>;

/// Pool tuning; the URL and size come from [`crate::config::CacheConfig`].
#[derive(Debug, Clone)]
pub struct CachePoolConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
}

impl CachePoolConfig {
    pub fn new(redis_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            redis_url: redis_url.into(),
            max_connections,
            min_idle: 1,
            connection_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Build the pool and probe it once. A failed probe is logged, not fatal.
pub async fn init_cache_pool(config: CachePoolConfig) -> CacheResult<RedisPool> {
    info!(
        max_connections = config.max_connections,
        "initializing redis pool"
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
        error!(error = %e, "failed to create redis connection manager");
        CacheError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_idle.min(config.max_connections)))
        .connection_timeout(config.connection_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .build(manager)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to build redis pool");
            CacheError::ConnectionError(e.to_string())
        })?;

    if let Err(e) = health_check(&pool).await {
        warn!(error = %e, "initial redis ping failed, continuing");
    }

    info!("redis pool initialized");
    Ok(pool)
}

/// PING through the pool.
pub async fn health_check(pool: &RedisPool) -> CacheResult<()> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}
