use atom_syndication::Feed as AtomFeed;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rss::Channel;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    fetcher::{
        errors::FetchError,
        types::{FeedEnvelope, FeedItem},
    },
    fingerprint::ContentHashes,
    normalizer::{first_non_empty, normalize},
};

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%a, %d %b %Y %H:%M:%S",
];

/// One entry from either syndication format, flattened into named optional
/// fields so the selection rules below can be written once.
#[derive(Debug, Default, Clone)]
pub struct RawEntry {
    pub guid: Option<String>,
    pub atom_id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub content_encoded: Option<String>,
    pub atom_content: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub published: Option<String>,
    pub dc_date: Option<String>,
    pub updated: Option<String>,
    pub author: Option<String>,
}

impl RawEntry {
    /// Body candidates, richest first.
    pub fn content_fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("content:encoded", self.content_encoded.as_deref()),
            ("content", self.atom_content.as_deref()),
            ("summary", self.summary.as_deref()),
            ("description", self.description.as_deref()),
        ]
    }

    pub fn date_fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("pubDate", self.pub_date.as_deref()),
            ("published", self.published.as_deref()),
            ("dc:date", self.dc_date.as_deref()),
            ("updated", self.updated.as_deref()),
        ]
    }

    pub fn identity_fields(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("guid", self.guid.as_deref()),
            ("id", self.atom_id.as_deref()),
            ("link", self.link.as_deref()),
        ]
    }

    fn from_rss(item: &rss::Item) -> Self {
        let dublin_core = item.dublin_core_ext();
        Self {
            guid: item.guid().map(|g| g.value().to_string()),
            link: item.link().map(str::to_string),
            title: item.title().map(str::to_string),
            content_encoded: item.content().map(str::to_string),
            description: item.description().map(str::to_string),
            pub_date: item.pub_date().map(str::to_string),
            dc_date: dublin_core.and_then(|dc| dc.dates().first().cloned()),
            author: item
                .author()
                .map(str::to_string)
                .or_else(|| dublin_core.and_then(|dc| dc.creators().first().cloned())),
            ..Self::default()
        }
    }

    fn from_atom(entry: &atom_syndication::Entry) -> Self {
        let link = entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|l| l.href().to_string());

        Self {
            atom_id: Some(entry.id().to_string()),
            link,
            title: Some(entry.title().value.clone()),
            atom_content: entry
                .content()
                .and_then(|c| c.value())
                .map(str::to_string),
            summary: entry.summary().map(|s| s.value.clone()),
            published: entry.published().map(|d| d.to_rfc3339()),
            updated: Some(entry.updated().to_rfc3339()),
            author: entry.authors().first().map(|p| p.name().to_string()),
            ..Self::default()
        }
    }
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(body: &[u8]) -> Result<FeedEnvelope, FetchError> {
    match Channel::read_from(body) {
        Ok(channel) => Ok(envelope_from_rss(&channel)),
        Err(rss_err) => match AtomFeed::read_from(body) {
            Ok(feed) => Ok(envelope_from_atom(&feed)),
            Err(atom_err) => Err(FetchError::Parse(format!(
                "not rss ({rss_err}) or atom ({atom_err})"
            ))),
        },
    }
}

fn envelope_from_rss(channel: &Channel) -> FeedEnvelope {
    let entries = channel.items().iter().map(RawEntry::from_rss).collect();
    build_envelope(
        channel.title(),
        non_empty(channel.description()),
        non_empty(channel.link()),
        channel.language().and_then(non_empty),
        entries,
    )
}

fn envelope_from_atom(feed: &AtomFeed) -> FeedEnvelope {
    let link = feed
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| feed.links().first())
        .map(|l| l.href().to_string());
    let entries = feed.entries().iter().map(RawEntry::from_atom).collect();
    build_envelope(
        &feed.title().value,
        feed.subtitle().and_then(|s| non_empty(&s.value)),
        link,
        feed.lang().and_then(non_empty),
        entries,
    )
}

fn build_envelope(
    title: &str,
    description: Option<String>,
    link: Option<String>,
    language: Option<String>,
    entries: Vec<RawEntry>,
) -> FeedEnvelope {
    let title = title.trim().to_string();
    let total = entries.len();
    let items: Vec<FeedItem> = entries
        .iter()
        .filter_map(|entry| build_item(&title, entry))
        .collect();

    FeedEnvelope {
        skipped_items: total - items.len(),
        title,
        description,
        link,
        language,
        items,
    }
}

/// Turn one raw entry into a normalized, fingerprinted item. Entries with
/// neither a title nor a body are skipped.
pub fn build_item(feed_title: &str, entry: &RawEntry) -> Option<FeedItem> {
    let raw_title = entry.title.as_deref().unwrap_or("").trim();
    let raw_content = first_non_empty(entry.content_fields().map(|(_, value)| value)).unwrap_or("");

    if raw_title.is_empty() && raw_content.trim().is_empty() {
        debug!(feed = feed_title, "skipping entry without title or content");
        return None;
    }

    let normalized = normalize(raw_title, raw_content);
    let hashes = ContentHashes::compute(&normalized.clean_title, &normalized.clean_content);
    let published_at = resolve_published(entry).unwrap_or_else(Utc::now);
    let guid = resolve_identity(feed_title, raw_title, entry);

    let link = entry
        .link
        .clone()
        .filter(|l| !l.trim().is_empty())
        .or_else(|| entry.guid.clone().filter(|g| is_web_url(g)));

    Some(FeedItem {
        guid,
        link,
        author: entry.author.clone(),
        published_at,
        raw_content: raw_content.to_string(),
        normalized,
        hashes,
    })
}

/// GUID/ID, then link, then a hash of `feedTitle:title:date`.
pub fn resolve_identity(feed_title: &str, title: &str, entry: &RawEntry) -> String {
    if let Some(id) = first_non_empty(entry.identity_fields().map(|(_, value)| value)) {
        return id.trim().to_string();
    }

    let date = first_non_empty(entry.date_fields().map(|(_, value)| value)).unwrap_or("");
    let basis = format!("{feed_title}:{title}:{date}");
    hex::encode(Sha256::digest(basis.as_bytes()))
}

/// First date-like field that parses; `None` means the caller uses "now".
pub fn resolve_published(entry: &RawEntry) -> Option<DateTime<Utc>> {
    entry
        .date_fields()
        .into_iter()
        .filter_map(|(field, value)| Some((field, value?)))
        .find_map(|(field, value)| {
            let parsed = parse_date(value);
            if parsed.is_none() {
                debug!(field, value, "unparseable date");
            }
            parsed
        })
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_web_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
