use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blackbird_backend::api::{build_router, AppState};
use blackbird_backend::config::AppConfig;
use blackbird_backend::database::catalog_repository::CatalogRepository;
use blackbird_backend::database::order_repository::OrderRepository;
use blackbird_backend::database::{init_pool_from_config, run_migrations};
use blackbird_backend::health::HealthChecker;
use blackbird_backend::logging::init_tracing;
use blackbird_backend::payments::providers::stripe::StripeProvider;
use blackbird_backend::payments::PaymentProcessor;
use blackbird_backend::services::{
    CheckoutService, InMemoryRateLimiter, OrderMaterializer, PaymentIntentIssuer, PriceReconciler,
    RateLimitPolicies, RateLimiter, WebhookProcessor,
};
use blackbird_backend::workers::rate_limit_sweeper::RateLimitSweeper;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

/// Shared Redis limiter when `REDIS_URL` is set, otherwise a local one plus
/// its sweeper.
#[cfg(feature = "cache")]
async fn build_rate_limiter(
    config: &AppConfig,
    health: HealthChecker,
    shutdown_rx: &watch::Receiver<bool>,
) -> anyhow::Result<(Arc<dyn RateLimiter>, HealthChecker, Option<JoinHandle<()>>)> {
    use blackbird_backend::cache::rate_limit::RedisRateLimiter;
    use blackbird_backend::cache::{init_cache_pool, CachePoolConfig};

    if let Some(url) = &config.cache.redis_url {
        let pool = init_cache_pool(CachePoolConfig::new(url.clone(), config.cache.max_connections))
            .await
            .context("failed to initialize Redis pool")?;
        info!("using Redis rate limiter");
        let health = health.with_cache(Some(pool.clone()));
        return Ok((Arc::new(RedisRateLimiter::new(pool)), health, None));
    }

    let (limiter, sweeper) = local_rate_limiter(config, shutdown_rx);
    Ok((limiter, health, Some(sweeper)))
}

#[cfg(not(feature = "cache"))]
async fn build_rate_limiter(
    config: &AppConfig,
    health: HealthChecker,
    shutdown_rx: &watch::Receiver<bool>,
) -> anyhow::Result<(Arc<dyn RateLimiter>, HealthChecker, Option<JoinHandle<()>>)> {
    if config.cache.redis_url.is_some() {
        warn!("REDIS_URL is set but the cache feature is disabled; limiting per instance");
    }
    let (limiter, sweeper) = local_rate_limiter(config, shutdown_rx);
    Ok((limiter, health, Some(sweeper)))
}

fn local_rate_limiter(
    config: &AppConfig,
    shutdown_rx: &watch::Receiver<bool>,
) -> (Arc<dyn RateLimiter>, JoinHandle<()>) {
    let limiter = Arc::new(InMemoryRateLimiter::new());
    let sweeper = RateLimitSweeper::new(
        limiter.clone(),
        Duration::from_secs(config.rate_limits.sweep_interval_secs),
    );
    let handle = tokio::spawn(sweeper.run(shutdown_rx.clone()));
    info!("using in-memory rate limiter");
    (limiter, handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "starting Blackbird backend"
    );

    let db_pool = init_pool_from_config(&config.database)
        .await
        .context("failed to initialize database pool")?;
    if config.database.run_migrations {
        run_migrations(&db_pool).await.context("failed to run migrations")?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health = HealthChecker::new(Some(db_pool.clone()));
    let (rate_limiter, health, sweeper_handle) =
        build_rate_limiter(&config, health, &shutdown_rx).await?;

    let processor: Arc<dyn PaymentProcessor> = Arc::new(
        StripeProvider::new(config.stripe.clone()).context("failed to build Stripe client")?,
    );

    let catalog = Arc::new(CatalogRepository::new(db_pool.clone()));
    let orders = Arc::new(OrderRepository::new(db_pool.clone()));

    let reconciler = PriceReconciler::new(
        catalog,
        config.checkout.fees.clone(),
        config.checkout.price_tolerance,
    );
    let issuer = PaymentIntentIssuer::new(
        processor.clone(),
        config.checkout.clone(),
        config.stripe.connected_account_id.clone(),
    );
    let materializer = OrderMaterializer::new(orders);

    let state = AppState {
        checkout: CheckoutService::new(reconciler, issuer, config.checkout.max_cart_items),
        materializer: materializer.clone(),
        webhooks: Arc::new(WebhookProcessor::new(processor, materializer)),
        rate_limiter,
        policies: RateLimitPolicies::from_settings(&config.rate_limits),
        health,
    };

    let app = build_router(state, &config.server.cors_allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx))
        .await
        .context("server error")?;

    if let Some(handle) = sweeper_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("rate limit sweeper did not stop within 5 seconds");
        }
    }

    info!("server stopped");
    Ok(())
}
