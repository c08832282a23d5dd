use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::{
    entities::{Item, NewItem, Source, SourceSyncUpdate, SyncStatus},
    storage::{IngestionStore, StorageError},
};

const SOURCE_COLUMNS: &str = r#"
    id, user_id, name, source_type, url, forwarding_address, is_active,
    sync_status, sync_error, error_count, etag, last_modified, last_not_modified,
    next_retry_at, last_sync_at, item_count, created_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, user_id, source_id, title, content, raw_content, url, published_at,
    normalized_hash, fingerprint, is_read, metadata, created_at
"#;

/// How many fingerprint matches to load; only the newest one decides.
const FINGERPRINT_MATCH_LIMIT: i64 = 5;

/// PostgreSQL-backed store. The unique index on `(user_id, normalized_hash)`
/// turns a lost dedup race into `StorageError::Conflict`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IngestionStore for PgStore {
    async fn create_item(&self, item: NewItem) -> Result<Item, StorageError> {
        let query = format!(
            r#"
            INSERT INTO items
                  (user_id, source_id, title, content, raw_content, url, published_at,
                   normalized_hash, fingerprint, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, Item>(&query)
            .bind(item.user_id)
            .bind(item.source_id)
            .bind(&item.title)
            .bind(&item.content)
            .bind(&item.raw_content)
            .bind(&item.url)
            .bind(item.published_at)
            .bind(&item.normalized_hash)
            .bind(&item.fingerprint)
            .bind(Json(&item.metadata))
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn update_source(&self, id: Uuid, update: SourceSyncUpdate) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE sources
            SET sync_status       = $2,
                sync_error        = $3,
                last_sync_at      = $4,
                etag              = $5,
                last_modified     = $6,
                last_not_modified = $7,
                error_count       = $8,
                next_retry_at     = $9
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.sync_status)
        .bind(&update.sync_error)
        .bind(update.last_sync_at)
        .bind(&update.etag)
        .bind(&update.last_modified)
        .bind(update.last_not_modified)
        .bind(update.error_count)
        .bind(update.next_retry_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SourceNotFound(id));
        }
        Ok(())
    }

    async fn find_item_by_exact_hash(
        &self,
        user_id: Uuid,
        hash: &str,
    ) -> Result<Option<Item>, StorageError> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE user_id = $1 AND normalized_hash = $2 LIMIT 1"
        );
        let item = sqlx::query_as::<_, Item>(&query)
            .bind(user_id)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn find_items_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<Vec<Item>, StorageError> {
        let query = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE user_id = $1 AND fingerprint = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#
        );
        let items = sqlx::query_as::<_, Item>(&query)
            .bind(user_id)
            .bind(fingerprint)
            .bind(FINGERPRINT_MATCH_LIMIT)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn find_sources_due_for_sync(&self, limit: usize) -> Result<Vec<Source>, StorageError> {
        let query = format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE is_active
              AND source_type = 'rss'::source_type
              AND sync_status <> 'syncing'::sync_status
              AND (next_retry_at IS NULL OR next_retry_at <= now())
            ORDER BY last_sync_at ASC NULLS FIRST
            LIMIT $1
            "#
        );
        let sources = sqlx::query_as::<_, Source>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StorageError> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1");
        let source = sqlx::query_as::<_, Source>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    async fn find_source_by_forwarding_address(
        &self,
        address: &str,
    ) -> Result<Option<Source>, StorageError> {
        let query = format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE is_active
              AND source_type = 'email-forwarding'::source_type
              AND lower(forwarding_address) = lower($1)
            LIMIT 1
            "#
        );
        let source = sqlx::query_as::<_, Source>(&query)
            .bind(address.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    async fn mark_syncing(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE sources SET sync_status = $2 WHERE id = $1 AND sync_status <> $2",
        )
        .bind(id)
        .bind(SyncStatus::Syncing)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sources WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StorageError::SourceNotFound(id))
        }
    }

    async fn increment_item_count(&self, id: Uuid, by: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE sources SET item_count = item_count + $2 WHERE id = $1")
            .bind(id)
            .bind(by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
