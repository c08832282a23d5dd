//! Exact and near-duplicate keys for normalized content.
//!
//! The exact hash is a SHA-256 over a canonical `title|content` string and is
//! used as a per-user uniqueness key. The near fingerprint is intentionally
//! lossy: a handful of salient tokens plus the opening of the body, hashed
//! with MD5 and truncated, so reposts and cross-posts collide.

pub mod dedup;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

pub use dedup::{DedupVerdict, IngestOutcome, IntakeChannel, check_duplicate, ingest_item};

const TITLE_TOKENS: usize = 5;
const TITLE_TOKEN_MIN_CHARS: usize = 4;
const CONTENT_TOKENS: usize = 10;
const CONTENT_TOKEN_MIN_CHARS: usize = 5;
const CONTENT_PREFIX_CHARS: usize = 50;
const FINGERPRINT_HEX_CHARS: usize = 8;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub normalized_hash: String,
    pub fingerprint: String,
}

impl ContentHashes {
    pub fn compute(title: &str, content: &str) -> Self {
        Self {
            normalized_hash: exact_hash(title, content),
            fingerprint: near_fingerprint(title, content),
        }
    }
}

/// Lower-cased, whitespace-collapsed SHA-256 of `title|content`, hex encoded.
pub fn exact_hash(title: &str, content: &str) -> String {
    let canonical = format!("{}|{}", canonicalize(title), canonicalize(content));
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Eight hex characters identifying near-identical content.
pub fn near_fingerprint(title: &str, content: &str) -> String {
    let title_tokens = salient_tokens(title, TITLE_TOKEN_MIN_CHARS, TITLE_TOKENS);
    let content_tokens = salient_tokens(content, CONTENT_TOKEN_MIN_CHARS, CONTENT_TOKENS);

    let prefix: String = content.chars().take(CONTENT_PREFIX_CHARS).collect();
    let prefix = NON_WORD.replace_all(&prefix.to_lowercase(), "").into_owned();

    let basis = format!(
        "{}|{}|{}",
        title_tokens.join(" "),
        content_tokens.join(" "),
        prefix
    );
    let digest = format!("{:x}", md5::compute(basis.as_bytes()));
    digest[..FINGERPRINT_HEX_CHARS].to_string()
}

fn canonicalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn salient_tokens(text: &str, min_chars: usize, limit: usize) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| NON_WORD.replace_all(token, "").into_owned())
        .filter(|token| token.chars().count() >= min_chars)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_hash_ignores_case_and_whitespace_runs() {
        assert_eq!(
            exact_hash("  Weekly   Update  ", "Hello World"),
            exact_hash("weekly update", "hello world")
        );
        assert_eq!(
            exact_hash("Title", "line one\n\n  line   two"),
            exact_hash("TITLE", "line one line two")
        );
    }

    #[test]
    fn test_exact_hash_matches_direct_sha256() {
        let expected = hex::encode(Sha256::digest(b"weekly update|hello world"));
        assert_eq!(exact_hash("  Weekly   Update  ", "Hello World"), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_exact_hash_is_sensitive_to_words() {
        let base = exact_hash("Weekly", "the quick brown fox");
        assert_ne!(base, exact_hash("Weekly", "the quick brown cat"));
        assert_ne!(base, exact_hash("Weekly", "the quick fox brown"));
        assert_ne!(base, exact_hash("Monthly", "the quick brown fox"));
    }

    #[test]
    fn test_exact_hash_separates_title_from_content() {
        assert_ne!(exact_hash("a b", "c"), exact_hash("a", "b c"));
    }

    #[test]
    fn test_near_fingerprint_shape() {
        let fp = near_fingerprint("Weekly Update", "Hello world, this is the content.");
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_near_fingerprint_groups_reposts() {
        let body = "Structured concurrency makes cancellation predictable across every spawned task in the program.";
        let original = near_fingerprint("Cancellation Matters", body);
        // Punctuation and case drift in a cross-post
        let repost = near_fingerprint(
            "CANCELLATION matters!",
            "Structured concurrency makes cancellation predictable across every spawned task in the program!!",
        );
        assert_eq!(original, repost);
        // Different story
        assert_ne!(original, near_fingerprint("Cancellation Matters", "Something else entirely."));
    }

    #[test]
    fn test_near_fingerprint_ignores_tail_beyond_salient_tokens() {
        let head = "Alpha bravo charlie delta echoes foxtrot golfers hotels indigo juliet kilos limas mikes";
        let a = format!("{head} first ending that differs");
        let b = format!("{head} second ending that differs");
        assert_eq!(near_fingerprint("Some title", &a), near_fingerprint("Some title", &b));
    }

    #[test]
    fn test_content_hashes_compute_both() {
        let hashes = ContentHashes::compute("Title", "Body text");
        assert_eq!(hashes.normalized_hash, exact_hash("Title", "Body text"));
        assert_eq!(hashes.fingerprint, near_fingerprint("Title", "Body text"));
    }

    #[cfg(feature = "fuzz")]
    mod fuzz {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_exact_hash_whitespace_invariant(words in proptest::collection::vec("[A-Za-z]{1,10}", 1..30)) {
                let tight = words.join(" ");
                let loose = format!("  {}  ", words.join("   \n "));
                prop_assert_eq!(exact_hash("t", &tight), exact_hash("T", &loose.to_uppercase()));
            }
        }
    }
}
