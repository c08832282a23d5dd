pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{Item, NewItem, Source, SourceSyncUpdate};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StorageError {
    /// `(user_id, normalized_hash)` already exists.
    #[error("item already exists for this owner")]
    Conflict { existing: Option<Uuid> },

    #[error("source {0} not found")]
    SourceNotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict { existing: None }
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}

/// The persistence calls the ingestion core depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionStore: Send + Sync {
    async fn create_item(&self, item: NewItem) -> Result<Item, StorageError>;

    async fn update_source(&self, id: Uuid, update: SourceSyncUpdate) -> Result<(), StorageError>;

    async fn find_item_by_exact_hash(
        &self,
        user_id: Uuid,
        hash: &str,
    ) -> Result<Option<Item>, StorageError>;

    /// Items sharing a near-duplicate fingerprint, newest first.
    async fn find_items_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<Vec<Item>, StorageError>;

    /// Active feed sources that are not mid-poll and whose retry time (if
    /// any) has passed, least recently synced first.
    async fn find_sources_due_for_sync(&self, limit: usize) -> Result<Vec<Source>, StorageError>;

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StorageError>;

    async fn find_source_by_forwarding_address(
        &self,
        address: &str,
    ) -> Result<Option<Source>, StorageError>;

    /// Claim a source for polling by flipping it to `syncing`. Returns
    /// `false` without touching it when another poll already holds it.
    async fn mark_syncing(&self, id: Uuid) -> Result<bool, StorageError>;

    async fn increment_item_count(&self, id: Uuid, by: i64) -> Result<(), StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}
