use serde::{Deserialize, Serialize};

use crate::{email::InboundEmail, fetcher::FeedEnvelope};

#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub to: Option<Vec<String>>,
}

/// Body posted by the inbound mail provider. Every field is optional at the
/// serde level so missing required fields get a 400 from
/// [`WebhookPayload::validate`] rather than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub envelope: Option<Envelope>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

impl WebhookPayload {
    pub fn validate(self) -> Result<InboundEmail, String> {
        let envelope_to: Vec<String> = self
            .envelope
            .and_then(|envelope| envelope.to)
            .unwrap_or_default()
            .into_iter()
            .map(|to| to.trim().to_string())
            .filter(|to| !to.is_empty())
            .collect();
        if envelope_to.is_empty() {
            return Err("envelope.to is required".to_string());
        }

        let raw = self.email.unwrap_or_default();
        if raw.trim().is_empty() {
            return Err("email is required".to_string());
        }

        Ok(InboundEmail {
            envelope_to,
            raw,
            subject: self.subject,
            from: self.from,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateSourceRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateSourceResponse {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub item_count: usize,
}

impl From<FeedEnvelope> for ValidateSourceResponse {
    fn from(feed: FeedEnvelope) -> Self {
        Self {
            item_count: feed.items.len(),
            title: feed.title,
            description: feed.description,
            link: feed.link,
            language: feed.language,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
