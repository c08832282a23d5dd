use crate::fetcher::{
    errors::{FetchError, is_retriable_status},
    parser::parse_feed,
    types::{CacheTokens, FeedEnvelope, FetchOutcome},
};
use bytes::{Bytes, BytesMut};
use reqwest::{
    Client, ClientBuilder, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const USER_AGENT: &str = "NewsfoldBot/0.1 (+https://newsfold.app/bot)";
const ACCEPT_FEEDS: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_size: u64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            max_body_size: MAX_BODY_SIZE,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Conditional-GET feed client. Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_body_size: u64,
}

impl FeedFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));

        let client = ClientBuilder::new()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Unknown(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            max_body_size: config.max_body_size,
        })
    }

    /// Fetch and parse a feed, sending the stored validators so an unchanged
    /// feed costs one round trip and no parsing.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str, tokens: &CacheTokens) -> Result<FetchOutcome, FetchError> {
        let target = validate_url(url)?;

        let mut request = self.client.get(target);
        if let Some(etag) = &tokens.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &tokens.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        let status = response.status();
        let fresh_tokens = tokens_from_headers(response.headers());

        if status == StatusCode::NOT_MODIFIED {
            debug!("feed not modified");
            return Ok(FetchOutcome::NotModified {
                tokens: fresh_tokens.merged_with(tokens),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Http {
                status,
                retriable: is_retriable_status(status),
            });
        }

        let body = self.read_capped(response).await?;
        let feed = parse_feed(&body)?;
        debug!(
            items = feed.items.len(),
            skipped = feed.skipped_items,
            "feed parsed"
        );

        Ok(FetchOutcome::Fetched {
            feed,
            tokens: fresh_tokens,
        })
    }

    /// Unconditional fetch used when a user adds a source. A feed with neither
    /// a title nor any entries is rejected.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<FeedEnvelope, FetchError> {
        match self.fetch(url, &CacheTokens::default()).await? {
            FetchOutcome::Fetched { feed, .. } if feed.title.is_empty() && feed.items.is_empty() => {
                Err(FetchError::EmptyFeed)
            }
            FetchOutcome::Fetched { feed, .. } => Ok(feed),
            // Without validators a 304 is a misbehaving server
            FetchOutcome::NotModified { .. } => Err(FetchError::Http {
                status: StatusCode::NOT_MODIFIED,
                retriable: false,
            }),
        }
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Bytes, FetchError> {
        // Check content length before downloading
        if let Some(content_length) = response.content_length()
            && content_length > self.max_body_size
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        // Compressed or chunked bodies carry no usable length, so count as we go
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(FetchError::from_reqwest_error)?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_body_size {
                return Err(FetchError::BodyTooLarge(body.len() as u64));
            }
        }
        Ok(body.freeze())
    }
}

fn validate_url(raw: &str) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(raw.trim())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

fn tokens_from_headers(headers: &HeaderMap) -> CacheTokens {
    let read = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    CacheTokens {
        etag: read(header::ETAG),
        last_modified: read(header::LAST_MODIFIED),
    }
}
