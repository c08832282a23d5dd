use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    entities::{Item, NewItem, Source, SourceSyncUpdate, SourceType, SyncStatus},
    storage::{IngestionStore, StorageError},
};

/// In-process store with the same uniqueness semantics as [`super::PgStore`].
/// Used by tests and single-node development.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sources: Arc<DashMap<Uuid, Source>>,
    items: Arc<DashMap<Uuid, Item>>,
    exact_index: Arc<DashMap<(Uuid, String), Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_source(&self, source: Source) -> Uuid {
        let id = source.id;
        self.sources.insert(id, source);
        id
    }

    pub fn source(&self, id: Uuid) -> Option<Source> {
        self.sources.get(&id).map(|s| s.clone())
    }

    pub fn items_for_user(&self, user_id: Uuid) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| item.created_at);
        items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl IngestionStore for MemoryStore {
    async fn create_item(&self, item: NewItem) -> Result<Item, StorageError> {
        let id = Uuid::new_v4();
        match self
            .exact_index
            .entry((item.user_id, item.normalized_hash.clone()))
        {
            Entry::Occupied(existing) => {
                return Err(StorageError::Conflict {
                    existing: Some(*existing.get()),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let created = Item {
            id,
            user_id: item.user_id,
            source_id: item.source_id,
            title: item.title,
            content: item.content,
            raw_content: item.raw_content,
            url: item.url,
            published_at: item.published_at,
            normalized_hash: item.normalized_hash,
            fingerprint: item.fingerprint,
            is_read: false,
            metadata: Json(item.metadata),
            created_at: Utc::now(),
        };
        self.items.insert(id, created.clone());
        Ok(created)
    }

    async fn update_source(&self, id: Uuid, update: SourceSyncUpdate) -> Result<(), StorageError> {
        let mut source = self
            .sources
            .get_mut(&id)
            .ok_or(StorageError::SourceNotFound(id))?;
        source.sync_status = update.sync_status;
        source.sync_error = update.sync_error;
        source.last_sync_at = Some(update.last_sync_at);
        source.etag = update.etag;
        source.last_modified = update.last_modified;
        source.last_not_modified = update.last_not_modified;
        source.error_count = update.error_count;
        source.next_retry_at = update.next_retry_at;
        Ok(())
    }

    async fn find_item_by_exact_hash(
        &self,
        user_id: Uuid,
        hash: &str,
    ) -> Result<Option<Item>, StorageError> {
        let id = self
            .exact_index
            .get(&(user_id, hash.to_string()))
            .map(|entry| *entry.value());
        Ok(id.and_then(|id| self.items.get(&id).map(|item| item.clone())))
    }

    async fn find_items_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<Vec<Item>, StorageError> {
        let mut matches: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.fingerprint == fingerprint)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn find_sources_due_for_sync(&self, limit: usize) -> Result<Vec<Source>, StorageError> {
        let now = Utc::now();
        let mut due: Vec<Source> = self
            .sources
            .iter()
            .filter(|entry| entry.is_due(now))
            .map(|entry| entry.value().clone())
            .collect();
        // `None` sorts before `Some`, so never-synced sources come first.
        due.sort_by_key(|source| source.last_sync_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StorageError> {
        Ok(self.source(id))
    }

    async fn find_source_by_forwarding_address(
        &self,
        address: &str,
    ) -> Result<Option<Source>, StorageError> {
        let address = address.trim();
        Ok(self
            .sources
            .iter()
            .find(|entry| {
                entry.is_active
                    && entry.source_type == SourceType::EmailForwarding
                    && entry
                        .forwarding_address
                        .as_deref()
                        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(address))
            })
            .map(|entry| entry.value().clone()))
    }

    async fn mark_syncing(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut source = self
            .sources
            .get_mut(&id)
            .ok_or(StorageError::SourceNotFound(id))?;
        if source.sync_status == SyncStatus::Syncing {
            return Ok(false);
        }
        source.sync_status = SyncStatus::Syncing;
        Ok(true)
    }

    async fn increment_item_count(&self, id: Uuid, by: i64) -> Result<(), StorageError> {
        if let Some(mut source) = self.sources.get_mut(&id) {
            source.item_count += by;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
