use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

use crate::normalizer::{NormalizedContent, cleaner::extract_links, language::detect_language};

/// --- PostgreSQL Enums ---
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "source_type", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Rss,
    EmailForwarding,
    Other,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    /// Whether the scheduler may pick a source in this state. A source that is
    /// still `Syncing` belongs to an in-flight poll and is never re-selected.
    pub fn is_schedulable(self) -> bool {
        !matches!(self, SyncStatus::Syncing)
    }
}

/// --- Tables ---

#[derive(Debug, Clone, FromRow)]
pub struct Source {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub url: Option<String>,
    pub forwarding_address: Option<String>,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub error_count: i32,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_not_modified: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new_feed(user_id: Uuid, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::blank(user_id, name.into(), SourceType::Rss, Some(url.into()), None)
    }

    pub fn new_forwarding(user_id: Uuid, address: impl Into<String>) -> Self {
        let address = address.into();
        Self::blank(
            user_id,
            address.clone(),
            SourceType::EmailForwarding,
            None,
            Some(address),
        )
    }

    fn blank(
        user_id: Uuid,
        name: String,
        source_type: SourceType,
        url: Option<String>,
        forwarding_address: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            source_type,
            url,
            forwarding_address,
            is_active: true,
            sync_status: SyncStatus::Pending,
            sync_error: None,
            error_count: 0,
            etag: None,
            last_modified: None,
            last_not_modified: false,
            next_retry_at: None,
            last_sync_at: None,
            item_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Eligible for the next scheduler cycle at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.source_type == SourceType::Rss
            && self.sync_status.is_schedulable()
            && self.next_retry_at.is_none_or(|at| at <= now)
    }
}

/// Sync metadata written after every poll attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSyncUpdate {
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_not_modified: bool,
    pub error_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub address: String,
    pub name: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub word_count: usize,
    pub read_time_minutes: u32,
    #[serde(default)]
    pub links: Vec<String>,
    pub language: Option<String>,
    pub sender: Option<SenderInfo>,
    pub guid: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ItemMetadata {
    /// Reading statistics, links and language derived from one piece of content.
    pub fn describe(content: &NormalizedContent, raw_content: &str) -> Self {
        Self {
            word_count: content.word_count,
            read_time_minutes: content.estimated_read_minutes,
            links: extract_links(raw_content),
            language: detect_language(&content.clean_content),
            sender: None,
            guid: None,
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_id: Uuid,
    pub title: String,
    pub content: String,
    pub raw_content: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub normalized_hash: String,
    pub fingerprint: String,
    pub is_read: bool,
    pub metadata: Json<ItemMetadata>,
    pub created_at: DateTime<Utc>,
}

/// An item ready to be written. `is_read` always starts false.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub user_id: Uuid,
    pub source_id: Uuid,
    pub title: String,
    pub content: String,
    pub raw_content: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub normalized_hash: String,
    pub fingerprint: String,
    pub metadata: ItemMetadata,
}
