//! Legitimacy scoring for forwarded email.
//!
//! Every check runs independently and produces a [`CheckResult`]. The results
//! are combined by [`score_checks`], a pure function of the collected
//! [`ValidationChecks`], so the weighting can be tested without parsing mail.

use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

use crate::email::{
    parser::{Mailbox, ParsedEmail},
    rate_limit::SenderRateLimiter,
};

pub const SENDER_WEIGHT: u32 = 3;
pub const RECIPIENT_WEIGHT: u32 = 2;
pub const NEWSLETTER_WEIGHT: u32 = 2;
pub const SPAM_WEIGHT: u32 = 2;
pub const RATE_LIMIT_WEIGHT: u32 = 1;
pub const CONTENT_WEIGHT: u32 = 1;

/// Minimum confidence for an email to be accepted.
pub const VALID_CONFIDENCE: u8 = 70;
/// Below this the risk level is always high.
pub const HIGH_RISK_CONFIDENCE: u8 = 50;
/// More issues than this make the risk level high.
pub const MAX_MEDIUM_RISK_ISSUES: usize = 2;

pub const NEWSLETTER_SIGNALS_REQUIRED: usize = 3;
pub const SPAM_SIGNALS_TOLERATED: u32 = 3;
pub const SUBSTANTIAL_BODY_CHARS: usize = 500;
pub const EXCESSIVE_LINKS: usize = 20;

const SUSPICIOUS_LOCAL_PART_LEN: usize = 20;

const DISPOSABLE_MARKERS: &[&str] = &[
    "mailinator",
    "guerrillamail",
    "10minutemail",
    "tempmail",
    "temp-mail",
    "throwaway",
    "yopmail",
    "trashmail",
    "sharklasers",
    "disposable",
];

const SPAM_KEYWORDS: &[&str] = &[
    "free money",
    "act now",
    "click here",
    "limited time",
    "you have won",
    "winner",
    "100% free",
    "risk-free",
    "risk free",
    "no credit check",
    "guaranteed income",
    "cash bonus",
    "double your",
    "urgent response",
    "crypto giveaway",
    "viagra",
];

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{6,}").unwrap());
static NEWSLETTER_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(newsletter|digest|weekly|daily|monthly|edition|roundup|round-up|briefing|bulletin|update|recap|issue)\b",
    )
    .unwrap()
});
static ISSUE_NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\b(issue|vol\.?|volume|no\.|number|edition|episode)\s*#?\s*\d+)|(#\d+\b)")
        .unwrap()
});
static UNSUBSCRIBE_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)unsubscribe|opt[\s-]?out|(manage|update|email)\s+(your\s+)?(email\s+)?preferences")
        .unwrap()
});
static TABLE_MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<table[\s>]").unwrap());
static EXCESSIVE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[!?]{3,}|(![^!]*){4,}").unwrap());
static HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']?https?://"#).unwrap());
static BARE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub passed: bool,
    /// Failure explanations. Passing checks carry none.
    pub issues: Vec<String>,
    /// Signal count for the counting checks (newsletter, spam, rate limit).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl CheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
            score: None,
        }
    }

    pub fn fail(issue: impl Into<String>) -> Self {
        Self {
            passed: false,
            issues: vec![issue.into()],
            score: None,
        }
    }

    fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationChecks {
    pub sender: CheckResult,
    pub recipient: CheckResult,
    pub newsletter: CheckResult,
    pub spam: CheckResult,
    pub rate_limit: CheckResult,
    pub content: CheckResult,
}

impl ValidationChecks {
    /// Checks whose failure rejects the email regardless of confidence.
    fn hard_failures(&self) -> impl Iterator<Item = &CheckResult> {
        [&self.sender, &self.recipient, &self.rate_limit, &self.content]
            .into_iter()
            .filter(|check| !check.passed)
    }

    fn weighted(&self) -> [(&CheckResult, u32); 6] {
        [
            (&self.sender, SENDER_WEIGHT),
            (&self.recipient, RECIPIENT_WEIGHT),
            (&self.newsletter, NEWSLETTER_WEIGHT),
            (&self.spam, SPAM_WEIGHT),
            (&self.rate_limit, RATE_LIMIT_WEIGHT),
            (&self.content, CONTENT_WEIGHT),
        ]
    }

    pub fn issues(&self) -> Vec<String> {
        self.weighted()
            .iter()
            .flat_map(|(check, _)| check.issues.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Score {
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub hard_failure: bool,
}

/// Weighted confidence and risk level for a set of check results.
pub fn score_checks(checks: &ValidationChecks) -> Score {
    let weighted = checks.weighted();
    let total: u32 = weighted.iter().map(|(_, weight)| weight).sum();
    let achieved: u32 = weighted
        .iter()
        .filter(|(check, _)| check.passed)
        .map(|(_, weight)| weight)
        .sum();

    let confidence = (100.0 * f64::from(achieved) / f64::from(total)).round() as u8;
    let issue_count = checks.issues().len();

    let risk_level = if confidence < HIGH_RISK_CONFIDENCE || issue_count > MAX_MEDIUM_RISK_ISSUES {
        RiskLevel::High
    } else if confidence < VALID_CONFIDENCE || issue_count > 0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    Score {
        confidence,
        risk_level,
        hard_failure: checks.hard_failures().next().is_some(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub checks: ValidationChecks,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn from_checks(checks: ValidationChecks) -> Self {
        let score = score_checks(&checks);
        let is_valid = !score.hard_failure && score.confidence >= VALID_CONFIDENCE;

        let reason = if is_valid {
            None
        } else if let Some(hard) = checks.hard_failures().next() {
            hard.issues.first().cloned()
        } else if !checks.spam.passed {
            Some("message looks like spam".to_string())
        } else {
            Some(format!(
                "confidence {} is below the required {VALID_CONFIDENCE}",
                score.confidence
            ))
        };

        Self {
            is_valid,
            confidence: score.confidence,
            risk_level: score.risk_level,
            checks,
            reason,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        !self.checks.rate_limit.passed
    }
}

/// Decides whether a forwarded email is newsletter content worth storing.
#[derive(Clone)]
pub struct EmailValidator {
    rate_limiter: Arc<dyn SenderRateLimiter>,
}

impl EmailValidator {
    pub fn new(rate_limiter: Arc<dyn SenderRateLimiter>) -> Self {
        Self { rate_limiter }
    }

    /// Counts the message against its sender's rate limit as a side effect.
    pub fn validate(&self, email: &ParsedEmail, expected_recipient: &str) -> ValidationVerdict {
        let checks = ValidationChecks {
            sender: check_sender(email.sender()),
            recipient: check_recipient(&email.to, expected_recipient),
            newsletter: check_newsletter(email),
            spam: check_spam(email),
            rate_limit: self.check_rate_limit(email.sender()),
            content: check_content(email),
        };
        ValidationVerdict::from_checks(checks)
    }

    fn check_rate_limit(&self, sender: Option<&Mailbox>) -> CheckResult {
        // Nothing to key on; the sender check already fails such mail
        let Some(domain) = sender.and_then(Mailbox::domain) else {
            return CheckResult::pass();
        };

        let decision = self.rate_limiter.check(domain);
        let result = if decision.allowed {
            CheckResult::pass()
        } else {
            CheckResult::fail(format!(
                "rate limit exceeded for {domain} ({} messages this window)",
                decision.count
            ))
        };
        result.with_score(decision.count)
    }
}

pub fn check_sender(sender: Option<&Mailbox>) -> CheckResult {
    let Some(sender) = sender else {
        return CheckResult::fail("missing sender address");
    };
    let local = sender.local_part().to_ascii_lowercase();
    let Some(domain) = sender.domain().map(str::to_ascii_lowercase) else {
        return CheckResult::fail(format!("invalid sender address: {}", sender.address));
    };
    if local.is_empty() || !domain.contains('.') {
        return CheckResult::fail(format!("invalid sender address: {}", sender.address));
    }

    if looks_generated(&local) {
        return CheckResult::fail("sender address looks randomly generated");
    }
    if DIGIT_RUN.is_match(&local) {
        return CheckResult::fail("sender address contains a long digit run");
    }
    if DISPOSABLE_MARKERS.iter().any(|marker| domain.contains(marker)) {
        return CheckResult::fail(format!("sender uses a disposable domain: {domain}"));
    }
    CheckResult::pass()
}

/// Long alphanumeric local parts read as machine-generated when they mix
/// digits into letters or carry almost no vowels. `weeklynewsletterteam` is
/// long but pronounceable and passes.
fn looks_generated(local: &str) -> bool {
    if local.len() < SUSPICIOUS_LOCAL_PART_LEN || !local.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }
    let letters = local.bytes().filter(u8::is_ascii_alphabetic).count();
    let digits = local.len() - letters;
    if letters > 0 && digits > 0 {
        return true;
    }
    let vowels = local.bytes().filter(|b| b"aeiouy".contains(b)).count();
    vowels * 5 < letters
}

pub fn check_recipient(to: &[Mailbox], expected: &str) -> CheckResult {
    let expected = expected.trim();
    if to
        .iter()
        .any(|mailbox| mailbox.address.trim().eq_ignore_ascii_case(expected))
    {
        CheckResult::pass()
    } else {
        CheckResult::fail(format!("not addressed to {expected}"))
    }
}

pub fn check_newsletter(email: &ParsedEmail) -> CheckResult {
    let body = email.raw_body();
    let signals = [
        NEWSLETTER_SUBJECT.is_match(&email.subject),
        ISSUE_NUMBERING.is_match(&email.subject) || ISSUE_NUMBERING.is_match(body),
        UNSUBSCRIBE_LANGUAGE.is_match(body),
        body.chars().count() > SUBSTANTIAL_BODY_CHARS,
        email.html.as_deref().is_some_and(|html| TABLE_MARKUP.is_match(html)),
    ];
    let hits = signals.iter().filter(|hit| **hit).count();

    let result = if hits >= NEWSLETTER_SIGNALS_REQUIRED {
        CheckResult::pass()
    } else {
        CheckResult::fail(format!(
            "only {hits} of {NEWSLETTER_SIGNALS_REQUIRED} newsletter signals present"
        ))
    };
    result.with_score(hits as u32)
}

/// Each spam keyword found counts once; punctuation, an all-caps subject and
/// a link-stuffed body count once each.
pub fn check_spam(email: &ParsedEmail) -> CheckResult {
    let body = email.raw_body();
    let haystack = format!("{}\n{}", email.subject, body).to_lowercase();
    let mut issues = Vec::new();
    let mut score = 0u32;

    let keyword_hits: Vec<&str> = SPAM_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| haystack.contains(keyword))
        .collect();
    if !keyword_hits.is_empty() {
        score += keyword_hits.len() as u32;
        issues.push(format!("spam keywords: {}", keyword_hits.join(", ")));
    }

    if EXCESSIVE_PUNCTUATION.is_match(&email.subject) {
        score += 1;
        issues.push("excessive punctuation in subject".to_string());
    }

    if is_shouting(&email.subject) {
        score += 1;
        issues.push("subject is all capitals".to_string());
    }

    let links = count_links(body);
    if links > EXCESSIVE_LINKS {
        score += 1;
        issues.push(format!("{links} links in body"));
    }

    if score < SPAM_SIGNALS_TOLERATED {
        CheckResult::pass().with_score(score)
    } else {
        CheckResult {
            passed: false,
            issues,
            score: Some(score),
        }
    }
}

pub fn check_content(email: &ParsedEmail) -> CheckResult {
    if email.subject.trim().is_empty() {
        CheckResult::fail("empty subject")
    } else if email.content.clean_content.trim().is_empty() {
        CheckResult::fail("empty body")
    } else {
        CheckResult::pass()
    }
}

fn is_shouting(subject: &str) -> bool {
    let letters: Vec<char> = subject.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 5 && letters.iter().all(|c| c.is_uppercase())
}

fn count_links(body: &str) -> usize {
    let hrefs = HREF.find_iter(body).count();
    if hrefs > 0 {
        hrefs
    } else {
        BARE_URL.find_iter(body).count()
    }
}
