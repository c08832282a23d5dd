use anyhow::Result;
use newsfold::{
    config::Config, fetcher::FeedFetcher, poller::FeedScheduler, storage::PgStore, telemetry,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let fetcher = FeedFetcher::new(&config.fetcher_config())?;
    let scheduler = FeedScheduler::new(store, fetcher, config.poller_config());

    // Spawn shutdown handler
    let shutdown_token = scheduler.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal, finishing current poll cycle...");
        shutdown_token.cancel();
    });

    scheduler.run().await;
    Ok(())
}
