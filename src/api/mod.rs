pub mod dtos;
pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    email::{EmailProcessor, EmailValidator, Notifier, SenderRateLimiter},
    fetcher::FeedFetcher,
    poller::SourcePoller,
    storage::IngestionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IngestionStore>,
    pub fetcher: FeedFetcher,
    pub poller: SourcePoller,
    pub processor: EmailProcessor,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IngestionStore>,
        fetcher: FeedFetcher,
        rate_limiter: Arc<dyn SenderRateLimiter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let validator = EmailValidator::new(rate_limiter);
        Self {
            poller: SourcePoller::new(store.clone(), fetcher.clone()),
            processor: EmailProcessor::new(store.clone(), validator, notifier),
            store,
            fetcher,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/webhooks/email", post(handlers::email_webhook))
        .route("/sources/validate", post(handlers::validate_source))
        .route("/sources/{id}/poll", post(handlers::poll_source))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
