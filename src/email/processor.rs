use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    email::{
        notify::Notifier,
        parser::{Mailbox, ParsedEmail, parse_raw_email},
        validator::{EmailValidator, RiskLevel, ValidationVerdict},
    },
    entities::{ItemMetadata, NewItem, SenderInfo, Source},
    fingerprint::{ContentHashes, IngestOutcome, IntakeChannel, ingest_item},
    normalizer::normalize,
    storage::IngestionStore,
};

/// A webhook delivery: envelope recipients plus the raw message.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Routes the message to a forwarding source. Not consulted by the
    /// recipient check.
    pub envelope_to: Vec<String>,
    pub raw: String,
    /// Used when the message itself has no Subject header.
    pub subject: Option<String>,
    /// Used when the message itself has no From header.
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl ProcessingResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            item_id: None,
            duplicate: false,
            risk_level: None,
            confidence: None,
        }
    }

    fn invalid(verdict: &ValidationVerdict) -> Self {
        Self {
            risk_level: Some(verdict.risk_level),
            confidence: Some(verdict.confidence),
            ..Self::rejected(
                verdict
                    .reason
                    .clone()
                    .unwrap_or_else(|| "email failed validation".to_string()),
            )
        }
    }

    fn accepted(verdict: &ValidationVerdict, item_id: Option<Uuid>, duplicate: bool) -> Self {
        Self {
            success: true,
            reason: duplicate.then(|| "duplicate content".to_string()),
            item_id,
            duplicate,
            risk_level: Some(verdict.risk_level),
            confidence: Some(verdict.confidence),
        }
    }
}

/// Inbound webhook path: route, parse, validate, dedup, store.
#[derive(Clone)]
pub struct EmailProcessor {
    store: Arc<dyn IngestionStore>,
    validator: EmailValidator,
    notifier: Arc<dyn Notifier>,
}

impl EmailProcessor {
    pub fn new(
        store: Arc<dyn IngestionStore>,
        validator: EmailValidator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            validator,
            notifier,
        }
    }

    /// Never fails: every problem becomes a `success: false` result so the
    /// webhook caller always gets a well-formed answer.
    #[instrument(skip_all, fields(recipients = inbound.envelope_to.len()))]
    pub async fn process(&self, inbound: InboundEmail) -> ProcessingResult {
        let source = match self.resolve_source(&inbound.envelope_to).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                info!("no forwarding source for recipients");
                return ProcessingResult::rejected("unknown forwarding address");
            }
            Err(reason) => return ProcessingResult::rejected(reason),
        };

        let email = match parse_raw_email(inbound.raw.as_bytes()) {
            Ok(email) => with_envelope(email, &inbound),
            Err(e) => {
                warn!(source_id = %source.id, error = %e, "unparseable email");
                return ProcessingResult::rejected("could not parse message");
            }
        };

        let expected = source.forwarding_address.as_deref().unwrap_or_default();
        let verdict = self.validator.validate(&email, expected);
        if !verdict.is_valid {
            info!(
                source_id = %source.id,
                confidence = verdict.confidence,
                risk = ?verdict.risk_level,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                "email rejected"
            );
            return ProcessingResult::invalid(&verdict);
        }

        let item = new_item_from_email(&source, &email);
        match ingest_item(self.store.as_ref(), item, IntakeChannel::Email).await {
            Ok(IngestOutcome::Created(item)) => {
                if let Err(e) = self.store.increment_item_count(source.id, 1).await {
                    warn!(source_id = %source.id, error = %e, "could not bump item count");
                }
                if let Err(e) = self.notifier.item_stored(&item, &source).await {
                    warn!(item_id = %item.id, error = %e, "notification failed");
                }
                info!(source_id = %source.id, item_id = %item.id, "email item stored");
                ProcessingResult::accepted(&verdict, Some(item.id), false)
            }
            Ok(IngestOutcome::Skipped(dedup)) => {
                debug!(source_id = %source.id, ?dedup, "duplicate email");
                ProcessingResult::accepted(&verdict, None, true)
            }
            Err(e) => {
                error!(source_id = %source.id, error = %e, "could not store email item");
                ProcessingResult::rejected("temporarily unable to store message")
            }
        }
    }

    async fn resolve_source(&self, recipients: &[String]) -> Result<Option<Source>, String> {
        for recipient in recipients {
            match self.store.find_source_by_forwarding_address(recipient).await {
                Ok(Some(source)) => return Ok(Some(source)),
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "forwarding address lookup failed");
                    return Err("temporarily unable to route message".to_string());
                }
            }
        }
        Ok(None)
    }
}

/// Fill gaps in the parsed message from the webhook envelope. Envelope
/// recipients only route the message; the recipient check reads the
/// message's own To, Cc and Delivered-To headers.
fn with_envelope(mut email: ParsedEmail, inbound: &InboundEmail) -> ParsedEmail {
    if email.from.is_empty()
        && let Some(from) = inbound.from.as_deref().filter(|f| !f.trim().is_empty())
    {
        email.from.push(Mailbox::new(from));
    }

    if email.subject.is_empty()
        && let Some(subject) = inbound.subject.as_deref().filter(|s| !s.trim().is_empty())
    {
        email.subject = subject.trim().to_string();
        email.content = normalize(&email.subject, email.raw_body());
    }

    email
}

fn new_item_from_email(source: &Source, email: &ParsedEmail) -> NewItem {
    let hashes = ContentHashes::compute(&email.content.clean_title, &email.content.clean_content);
    let sender = email.sender().map(|mailbox| SenderInfo {
        address: mailbox.address.clone(),
        name: mailbox.name.clone(),
        domain: mailbox.domain().map(str::to_string),
    });

    let raw_content = email.raw_body().to_string();
    let metadata = ItemMetadata {
        sender,
        guid: email.message_id.clone(),
        ..ItemMetadata::describe(&email.content, &raw_content)
    };

    NewItem {
        user_id: source.user_id,
        source_id: source.id,
        title: email.content.clean_title.clone(),
        content: email.content.clean_content.clone(),
        url: metadata.links.first().cloned(),
        raw_content,
        published_at: email.date.unwrap_or_else(Utc::now),
        normalized_hash: hashes.normalized_hash,
        fingerprint: hashes.fingerprint,
        metadata,
    }
}
