use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::{
    entities::{Item, NewItem},
    fingerprint::ContentHashes,
    storage::{IngestionStore, StorageError},
};

/// Which intake path produced an item; selects the near-duplicate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeChannel {
    Feed,
    Email,
}

impl IntakeChannel {
    pub fn near_duplicate_window(self) -> Duration {
        match self {
            IntakeChannel::Feed => Duration::days(7),
            IntakeChannel::Email => Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Unique,
    ExactDuplicate { existing: Uuid },
    NearDuplicate { existing: Uuid },
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DedupVerdict::Unique)
    }
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created(Item),
    Skipped(DedupVerdict),
}

/// Pure policy: exact matches always win; fingerprint matches only count
/// when the earlier item was created inside the channel's window.
pub fn classify(
    exact_match: Option<&Item>,
    fingerprint_matches: &[Item],
    channel: IntakeChannel,
    now: DateTime<Utc>,
) -> DedupVerdict {
    if let Some(existing) = exact_match {
        return DedupVerdict::ExactDuplicate {
            existing: existing.id,
        };
    }

    let window_start = now - channel.near_duplicate_window();
    fingerprint_matches
        .iter()
        .find(|item| item.created_at >= window_start)
        .map(|item| DedupVerdict::NearDuplicate { existing: item.id })
        .unwrap_or(DedupVerdict::Unique)
}

pub async fn check_duplicate(
    store: &dyn IngestionStore,
    user_id: Uuid,
    hashes: &ContentHashes,
    channel: IntakeChannel,
    now: DateTime<Utc>,
) -> Result<DedupVerdict, StorageError> {
    let exact = store
        .find_item_by_exact_hash(user_id, &hashes.normalized_hash)
        .await?;
    if exact.is_some() {
        return Ok(classify(exact.as_ref(), &[], channel, now));
    }

    let near = store
        .find_items_by_fingerprint(user_id, &hashes.fingerprint)
        .await?;
    Ok(classify(None, &near, channel, now))
}

/// Dedup check followed by the write. The check and write are not atomic;
/// a uniqueness conflict reported by the store is folded into an exact
/// duplicate so a lost race reads the same as a detected one.
pub async fn ingest_item(
    store: &dyn IngestionStore,
    item: NewItem,
    channel: IntakeChannel,
) -> Result<IngestOutcome, StorageError> {
    let hashes = ContentHashes {
        normalized_hash: item.normalized_hash.clone(),
        fingerprint: item.fingerprint.clone(),
    };

    let verdict = check_duplicate(store, item.user_id, &hashes, channel, Utc::now()).await?;
    if verdict.is_duplicate() {
        debug!(hash = %hashes.normalized_hash, ?verdict, "skipping duplicate item");
        return Ok(IngestOutcome::Skipped(verdict));
    }

    match store.create_item(item).await {
        Ok(created) => Ok(IngestOutcome::Created(created)),
        Err(StorageError::Conflict { existing }) => {
            debug!(hash = %hashes.normalized_hash, "lost insert race to a concurrent writer");
            Ok(IngestOutcome::Skipped(DedupVerdict::ExactDuplicate {
                existing: existing.unwrap_or_else(Uuid::nil),
            }))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ItemMetadata;
    use sqlx::types::Json;

    fn item_created_at(created_at: DateTime<Utc>) -> Item {
        Item {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            title: "t".into(),
            content: "c".into(),
            raw_content: "c".into(),
            url: None,
            published_at: created_at,
            normalized_hash: "h".into(),
            fingerprint: "f".into(),
            is_read: false,
            metadata: Json(ItemMetadata {
                word_count: 1,
                read_time_minutes: 1,
                links: vec![],
                language: None,
                sender: None,
                guid: None,
                processed_at: created_at,
            }),
            created_at,
        }
    }

    #[test]
    fn test_exact_match_rejects_at_any_age() {
        let now = Utc::now();
        let ancient = item_created_at(now - Duration::days(400));
        let verdict = classify(Some(&ancient), &[], IntakeChannel::Feed, now);
        assert_eq!(verdict, DedupVerdict::ExactDuplicate { existing: ancient.id });
    }

    #[test]
    fn test_near_match_inside_feed_window() {
        let now = Utc::now();
        let recent = item_created_at(now - Duration::days(6));
        let verdict = classify(None, std::slice::from_ref(&recent), IntakeChannel::Feed, now);
        assert_eq!(verdict, DedupVerdict::NearDuplicate { existing: recent.id });
    }

    #[test]
    fn test_near_match_outside_window_is_accepted() {
        let now = Utc::now();
        let old = item_created_at(now - Duration::days(8));
        assert_eq!(
            classify(None, &[old], IntakeChannel::Feed, now),
            DedupVerdict::Unique
        );
    }

    #[test]
    fn test_email_window_is_one_day() {
        let now = Utc::now();
        let two_days = item_created_at(now - Duration::hours(48));
        let one_hour = item_created_at(now - Duration::hours(1));

        assert_eq!(
            classify(None, &[two_days.clone()], IntakeChannel::Email, now),
            DedupVerdict::Unique
        );
        // Same item is still inside the 7 day feed window
        assert!(classify(None, &[two_days], IntakeChannel::Feed, now).is_duplicate());
        assert!(classify(None, &[one_hour], IntakeChannel::Email, now).is_duplicate());
    }
}
