pub mod client;
pub mod errors;
pub mod parser;
pub mod types;

pub use client::{FeedFetcher, FetcherConfig};
pub use errors::FetchError;
pub use parser::parse_feed;
pub use types::{CacheTokens, FeedEnvelope, FeedItem, FetchOutcome};
