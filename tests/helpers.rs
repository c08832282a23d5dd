#![allow(dead_code)]

use axum::Router;
use std::sync::Arc;

use newsfold::{
    api::{AppState, router},
    email::{DomainRateLimiter, LogNotifier},
    fetcher::{FeedFetcher, FetcherConfig},
    storage::MemoryStore,
};

pub struct FeedEntry<'a> {
    pub guid: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

pub fn rss_feed(title: &str, entries: &[FeedEntry<'_>]) -> String {
    let items: String = entries
        .iter()
        .map(|entry| {
            format!(
                "<item><title>{}</title><link>https://example.com/{}</link>\
                 <guid>{}</guid><description><![CDATA[{}]]></description>\
                 <pubDate>Tue, 10 Jun 2025 08:00:00 GMT</pubDate></item>",
                entry.title, entry.guid, entry.guid, entry.body
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel><title>{title}</title>\
         <link>https://example.com</link><description>Test feed</description>{items}\
         </channel></rss>"
    )
}

pub fn atom_feed(title: &str, entries: &[FeedEntry<'_>]) -> String {
    let items: String = entries
        .iter()
        .map(|entry| {
            format!(
                "<entry><title>{}</title><id>urn:{}</id>\
                 <link rel=\"alternate\" href=\"https://example.com/{}\"/>\
                 <updated>2025-06-10T08:00:00Z</updated>\
                 <content type=\"text\">{}</content></entry>",
                entry.title,
                entry.guid,
                entry.guid,
                escape_xml(entry.body)
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <feed xmlns=\"http://www.w3.org/2005/Atom\"><title>{title}</title>\
         <id>urn:feed</id><updated>2025-06-10T08:00:00Z</updated>{items}</feed>"
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn fetcher() -> FeedFetcher {
    FeedFetcher::new(&FetcherConfig::default()).unwrap()
}

/// A forwarded newsletter that passes every validation check, as the
/// receiving mail server delivers it: the To header names the original
/// subscriber and Delivered-To names `to`.
pub fn raw_newsletter(to: &str, from: &str, subject: &str) -> String {
    let filler = "This week: async runtimes, error handling and property testing. ".repeat(10);
    format!(
        "From: Weekly Byte <{from}>\r\n\
         Delivered-To: {to}\r\n\
         To: reader@example.org\r\n\
         Subject: {subject}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         <table><tr><td><p>{filler}</p>\
         <p>Read online at https://weeklybyte.example.com/issues</p>\
         <p>Unsubscribe or manage your preferences.</p></td></tr></table>\r\n"
    )
}

pub fn test_app(store: MemoryStore) -> Router {
    let state = AppState::new(
        Arc::new(store),
        fetcher(),
        Arc::new(DomainRateLimiter::default()),
        Arc::new(LogNotifier),
    );
    router(state)
}
