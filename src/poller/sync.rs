use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{ItemMetadata, NewItem, Source, SourceSyncUpdate, SourceType, SyncStatus},
    fetcher::{CacheTokens, FeedEnvelope, FeedFetcher, FeedItem, FetchOutcome},
    fingerprint::{IngestOutcome, IntakeChannel, ingest_item},
    poller::backoff::next_retry_at,
    storage::{IngestionStore, StorageError},
};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("source {0} not found")]
    SourceNotFound(Uuid),

    #[error("source {0} is not a feed")]
    NotAFeed(Uuid),

    #[error("source {0} is already being polled")]
    AlreadySyncing(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What one poll attempt did to a source.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub source_id: Uuid,
    pub status: SyncStatus,
    pub not_modified: bool,
    pub items_seen: usize,
    pub items_created: usize,
    pub duplicates: usize,
    pub skipped_entries: usize,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl PollOutcome {
    fn empty(source_id: Uuid, status: SyncStatus) -> Self {
        Self {
            source_id,
            status,
            not_modified: false,
            items_seen: 0,
            items_created: 0,
            duplicates: 0,
            skipped_entries: 0,
            error: None,
            next_retry_at: None,
        }
    }
}

#[derive(Default)]
struct IngestTally {
    created: usize,
    duplicates: usize,
}

/// Runs the fetch, dedup and write path for one source and records the
/// result in the source's sync state.
#[derive(Clone)]
pub struct SourcePoller {
    store: Arc<dyn IngestionStore>,
    fetcher: FeedFetcher,
}

impl SourcePoller {
    pub fn new(store: Arc<dyn IngestionStore>, fetcher: FeedFetcher) -> Self {
        Self { store, fetcher }
    }

    /// Manual poll. Skips the scheduling gate but walks the same state machine.
    pub async fn poll_source_by_id(&self, id: Uuid) -> Result<PollOutcome, PollError> {
        let source = self
            .store
            .get_source(id)
            .await?
            .ok_or(PollError::SourceNotFound(id))?;
        if source.source_type != SourceType::Rss {
            return Err(PollError::NotAFeed(id));
        }
        self.poll_source(&source).await
    }

    /// Fetch-level failures are absorbed into the source's state; only storage
    /// failures come back as `Err`. A source another poll has already claimed
    /// is left alone.
    #[instrument(skip_all, fields(source_id = %source.id))]
    pub async fn poll_source(&self, source: &Source) -> Result<PollOutcome, PollError> {
        if !self.store.mark_syncing(source.id).await? {
            debug!("source already claimed by another poll");
            return Err(PollError::AlreadySyncing(source.id));
        }

        match self.sync(source).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.release(source, &e).await;
                Err(e.into())
            }
        }
    }

    /// Everything after the claim. Any `Err` here leaves the source marked
    /// `syncing` until [`SourcePoller::release`] records it.
    async fn sync(&self, source: &Source) -> Result<PollOutcome, StorageError> {
        let Some(url) = source.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return self.record_failure(source, "source has no feed url").await;
        };

        let tokens = CacheTokens {
            etag: source.etag.clone(),
            last_modified: source.last_modified.clone(),
        };

        match self.fetcher.fetch(url, &tokens).await {
            Ok(FetchOutcome::NotModified { tokens }) => {
                debug!("feed unchanged since last poll");
                let mut outcome = PollOutcome::empty(source.id, SyncStatus::Success);
                outcome.not_modified = true;
                self.record_success(source, &tokens, true).await?;
                Ok(outcome)
            }
            Ok(FetchOutcome::Fetched { feed, tokens }) => {
                let tally = self.ingest_feed(source, &feed).await?;
                if tally.created > 0 {
                    self.store
                        .increment_item_count(source.id, tally.created as i64)
                        .await?;
                }
                self.record_success(source, &tokens, false).await?;

                info!(
                    seen = feed.items.len(),
                    created = tally.created,
                    duplicates = tally.duplicates,
                    "feed polled"
                );
                Ok(PollOutcome {
                    items_seen: feed.items.len(),
                    items_created: tally.created,
                    duplicates: tally.duplicates,
                    skipped_entries: feed.skipped_items,
                    ..PollOutcome::empty(source.id, SyncStatus::Success)
                })
            }
            Err(e) => {
                if e.should_retry() {
                    warn!(error = %e, "feed fetch failed");
                } else {
                    warn!(error = %e, "feed fetch failed permanently until fixed");
                }
                self.record_failure(source, &e.to_string()).await
            }
        }
    }

    async fn ingest_feed(
        &self,
        source: &Source,
        feed: &FeedEnvelope,
    ) -> Result<IngestTally, StorageError> {
        let mut tally = IngestTally::default();
        for entry in &feed.items {
            let item = new_item_from_feed(source, entry);
            match ingest_item(self.store.as_ref(), item, IntakeChannel::Feed).await? {
                IngestOutcome::Created(_) => tally.created += 1,
                IngestOutcome::Skipped(verdict) => {
                    debug!(guid = %entry.guid, ?verdict, "duplicate feed entry");
                    tally.duplicates += 1;
                }
            }
        }
        Ok(tally)
    }

    async fn record_success(
        &self,
        source: &Source,
        tokens: &CacheTokens,
        not_modified: bool,
    ) -> Result<(), StorageError> {
        let update = SourceSyncUpdate {
            sync_status: SyncStatus::Success,
            sync_error: None,
            last_sync_at: Utc::now(),
            etag: tokens.etag.clone(),
            last_modified: tokens.last_modified.clone(),
            last_not_modified: not_modified,
            error_count: 0,
            next_retry_at: None,
        };
        self.store.update_source(source.id, update).await
    }

    async fn record_failure(
        &self,
        source: &Source,
        message: &str,
    ) -> Result<PollOutcome, StorageError> {
        let now = Utc::now();
        let error_count = source.error_count.saturating_add(1);
        let retry_at = next_retry_at(error_count, now);

        let update = SourceSyncUpdate {
            sync_status: SyncStatus::Error,
            sync_error: Some(message.to_string()),
            last_sync_at: now,
            etag: source.etag.clone(),
            last_modified: source.last_modified.clone(),
            last_not_modified: false,
            error_count,
            next_retry_at: Some(retry_at),
        };
        self.store.update_source(source.id, update).await?;

        Ok(PollOutcome {
            error: Some(message.to_string()),
            next_retry_at: Some(retry_at),
            ..PollOutcome::empty(source.id, SyncStatus::Error)
        })
    }

    /// Best effort: a failure mid-poll must not leave the source stuck in
    /// `syncing`, where the scheduler would never pick it again.
    pub(crate) async fn release(&self, source: &Source, cause: &(dyn std::fmt::Display + Sync)) {
        if let Err(e) = self.record_failure(source, &cause.to_string()).await {
            warn!(error = %e, "could not release source after failed poll");
        }
    }
}

fn new_item_from_feed(source: &Source, entry: &FeedItem) -> NewItem {
    let metadata = ItemMetadata {
        guid: Some(entry.guid.clone()),
        ..ItemMetadata::describe(&entry.normalized, &entry.raw_content)
    };

    NewItem {
        user_id: source.user_id,
        source_id: source.id,
        title: entry.normalized.clean_title.clone(),
        content: entry.normalized.clean_content.clone(),
        raw_content: entry.raw_content.clone(),
        url: entry.link.clone(),
        published_at: entry.published_at,
        normalized_hash: entry.hashes.normalized_hash.clone(),
        fingerprint: entry.hashes.fingerprint.clone(),
        metadata,
    }
}
