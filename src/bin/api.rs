use anyhow::Result;
use newsfold::{
    api::{AppState, router},
    config::Config,
    email::{DomainRateLimiter, LogNotifier},
    fetcher::FeedFetcher,
    storage::PgStore,
    telemetry,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;
    let store = Arc::new(PgStore::new(pool));

    let fetcher = FeedFetcher::new(&config.fetcher_config())?;
    let rate_limiter = DomainRateLimiter::new(config.rate_limit_policy());

    let shutdown_token = CancellationToken::new();
    let reset_handle = rate_limiter.spawn_reset_task(shutdown_token.clone());

    let state = AppState::new(store, fetcher, Arc::new(rate_limiter), Arc::new(LogNotifier));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("listening on {}", listener.local_addr()?);

    let token = shutdown_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal, initiating graceful shutdown...");
            token.cancel();
        })
        .await?;

    shutdown_token.cancel();
    reset_handle.await?;
    Ok(())
}
