use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{fingerprint::ContentHashes, normalizer::NormalizedContent};

/// Validators from the previous successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTokens {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheTokens {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Prefer validators the server just sent, keep the old ones otherwise.
    pub fn merged_with(self, previous: &CacheTokens) -> CacheTokens {
        CacheTokens {
            etag: self.etag.or_else(|| previous.etag.clone()),
            last_modified: self
                .last_modified
                .or_else(|| previous.last_modified.clone()),
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    NotModified { tokens: CacheTokens },
    Fetched { feed: FeedEnvelope, tokens: CacheTokens },
}

#[derive(Debug, Clone)]
pub struct FeedEnvelope {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub items: Vec<FeedItem>,
    /// Entries dropped because they carried neither a title nor content.
    pub skipped_items: usize,
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub guid: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub raw_content: String,
    pub normalized: NormalizedContent,
    pub hashes: ContentHashes,
}
