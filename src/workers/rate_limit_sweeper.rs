use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::services::rate_limiter::InMemoryRateLimiter;

/// Periodically evicts expired in-memory rate-limit windows.
pub struct RateLimitSweeper {
    limiter: Arc<InMemoryRateLimiter>,
    interval: Duration,
}

impl RateLimitSweeper {
    pub fn new(limiter: Arc<InMemoryRateLimiter>, interval: Duration) -> Self {
        Self { limiter, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "rate limit sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("rate limit sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    let removed = self.limiter.sweep();
                    debug!(removed, tracked = self.limiter.len(), "rate limit sweep complete");
                }
            }
        }

        info!("rate limit sweeper stopped");
    }
}
