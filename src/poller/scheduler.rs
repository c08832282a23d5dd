use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    task::JoinSet,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    entities::SyncStatus,
    fetcher::FeedFetcher,
    poller::sync::{PollError, PollOutcome, SourcePoller},
    storage::{IngestionStore, StorageError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub page_size: usize,
    pub batch_width: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            page_size: 50,
            batch_width: 5,
        }
    }
}

/// Tally of one scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub selected: usize,
    pub succeeded: usize,
    pub not_modified: usize,
    pub failed: usize,
    pub items_created: usize,
    /// Polls that hit a storage failure or panicked.
    pub aborted: usize,
    /// Sources a concurrent poll had already claimed.
    pub skipped: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &PollOutcome) {
        match outcome.status {
            SyncStatus::Success => {
                self.succeeded += 1;
                if outcome.not_modified {
                    self.not_modified += 1;
                }
            }
            _ => self.failed += 1,
        }
        self.items_created += outcome.items_created;
    }
}

/// Periodic poller over every due feed source, a fixed number at a time.
pub struct FeedScheduler {
    store: Arc<dyn IngestionStore>,
    poller: SourcePoller,
    config: PollerConfig,
    shutdown_token: CancellationToken,
}

impl FeedScheduler {
    pub fn new(store: Arc<dyn IngestionStore>, fetcher: FeedFetcher, config: PollerConfig) -> Self {
        Self {
            poller: SourcePoller::new(store.clone(), fetcher),
            store,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancel this token to stop [`FeedScheduler::run`] after the current cycle.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn poller(&self) -> &SourcePoller {
        &self.poller
    }

    /// Run one cycle immediately, then one per interval until cancelled. An
    /// in-flight cycle is allowed to finish.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            page_size = self.config.page_size,
            batch_width = self.config.batch_width,
            "starting feed scheduler"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("feed scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let span = info_span!("poll_cycle");
                    match self.run_cycle().instrument(span).await {
                        Ok(report) => info!(?report, "poll cycle finished"),
                        Err(e) => error!(error = %e, "could not select sources for polling"),
                    }
                }
            }
        }
    }

    /// Select due sources and poll them in batches, waiting for each batch
    /// before starting the next. One source failing never stops its siblings.
    pub async fn run_cycle(&self) -> Result<CycleReport, StorageError> {
        let sources = self
            .store
            .find_sources_due_for_sync(self.config.page_size)
            .await?;

        let mut report = CycleReport {
            selected: sources.len(),
            ..CycleReport::default()
        };
        if sources.is_empty() {
            debug!("no sources due");
            return Ok(report);
        }

        for batch in sources.chunks(self.config.batch_width.max(1)) {
            let mut tasks = JoinSet::new();
            let mut in_flight = HashMap::new();
            for source in batch {
                let poller = self.poller.clone();
                let task_source = source.clone();
                let span = info_span!("poll_source", source_id = %source.id, name = %source.name);
                let handle = tasks
                    .spawn(async move { poller.poll_source(&task_source).await }.instrument(span));
                in_flight.insert(handle.id(), source);
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                match joined {
                    Ok((_, Ok(outcome))) => report.record(&outcome),
                    Ok((_, Err(PollError::AlreadySyncing(id)))) => {
                        debug!(source_id = %id, "source already being polled");
                        report.skipped += 1;
                    }
                    Ok((_, Err(PollError::Storage(e)))) => {
                        error!(error = %e, "storage failure during poll");
                        report.aborted += 1;
                    }
                    Ok((_, Err(e))) => {
                        warn!(error = %e, "poll rejected");
                        report.aborted += 1;
                    }
                    Err(e) => {
                        error!(error = %e, "poll task panicked");
                        report.aborted += 1;
                        // The task died holding its claim
                        if let Some(source) = in_flight.get(&e.id()) {
                            self.poller.release(source, &e).await;
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetcher::FetcherConfig, storage::MockIngestionStore};
    use mockall::predicate::eq;

    fn scheduler(store: MockIngestionStore, config: PollerConfig) -> FeedScheduler {
        let fetcher = FeedFetcher::new(&FetcherConfig::default()).unwrap();
        FeedScheduler::new(Arc::new(store), fetcher, config)
    }

    #[tokio::test]
    async fn test_empty_cycle_uses_page_size() {
        let mut store = MockIngestionStore::new();
        store
            .expect_find_sources_due_for_sync()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(vec![]));

        let config = PollerConfig {
            page_size: 7,
            ..PollerConfig::default()
        };
        let report = scheduler(store, config).run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn test_selection_failure_escalates() {
        let mut store = MockIngestionStore::new();
        store
            .expect_find_sources_due_for_sync()
            .returning(|_| Err(StorageError::Backend("pool timed out".into())));

        let result = scheduler(store, PollerConfig::default()).run_cycle().await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let mut store = MockIngestionStore::new();
        store
            .expect_find_sources_due_for_sync()
            .returning(|_| Ok(vec![]));

        let scheduler = scheduler(store, PollerConfig::default());
        let token = scheduler.shutdown_token();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), scheduler.run())
            .await
            .expect("scheduler did not stop");
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.batch_width, 5);
    }
}
