use std::fs;

use crate::normalizer::{first_non_empty, normalize};

#[test]
fn test_normalize_newsletter_fixture() {
    let html = fs::read_to_string("src/normalizer/tests/fixtures/newsletter.html")
        .expect("Failed to read test fixture");

    let normalized = normalize("Fwd: The Weekly Byte #87", &html);

    assert_eq!(normalized.clean_title, "The Weekly Byte #87");
    assert!(normalized.clean_content.contains("Hello readers,"));
    assert!(normalized.clean_content.contains("structured concurrency"));
    assert!(
        normalized
            .clean_content
            .contains("Bounded fan-out keeps remote hosts happy")
    );

    // Chrome, tracking and boilerplate are gone
    assert!(!normalized.clean_content.contains("View this email"));
    assert!(!normalized.clean_content.contains("Unsubscribe"));
    assert!(!normalized.clean_content.contains("receiving this"));
    assert!(!normalized.clean_content.contains("trackOpen"));
    assert!(!normalized.clean_content.contains("font-family"));
    assert!(!normalized.clean_content.contains('\u{200B}'));
    assert!(!normalized.clean_content.contains('<'));

    assert_eq!(
        normalized.word_count,
        normalized.clean_content.split_whitespace().count()
    );
    assert_eq!(normalized.estimated_read_minutes, 1);
}

#[test]
fn test_normalize_plain_text_bypasses_html_handling() {
    let normalized = normalize("RE: Notes", "Hello   World\n\n\n\nBye <3 &amp; more");

    assert_eq!(normalized.clean_title, "Notes");
    assert_eq!(normalized.clean_content, "Hello World\n\nBye <3 & more");
    assert_eq!(normalized.word_count, 6);
    assert_eq!(normalized.estimated_read_minutes, 1);
}

#[test]
fn test_normalize_block_structure_is_preserved() {
    let normalized = normalize("Title", "<p>First paragraph.</p><p>Second paragraph.</p>");
    assert_eq!(
        normalized.clean_content,
        "First paragraph.\n\nSecond paragraph."
    );
}

#[test]
fn test_normalize_empty_input() {
    let normalized = normalize("", "");
    assert_eq!(normalized.clean_title, "Untitled");
    assert_eq!(normalized.clean_content, "");
    assert_eq!(normalized.word_count, 0);
    assert_eq!(normalized.estimated_read_minutes, 0);
}

#[test]
fn test_reading_time_for_long_content() {
    let body = "word ".repeat(401);
    let normalized = normalize("Long read", &body);
    assert_eq!(normalized.word_count, 401);
    assert_eq!(normalized.estimated_read_minutes, 3);
}

#[test]
fn test_first_non_empty_respects_priority() {
    let encoded = Some("   ");
    let summary = Some("<p>Summary</p>");
    let description = Some("Description");
    assert_eq!(
        first_non_empty([encoded, None, summary, description]),
        Some("<p>Summary</p>")
    );
    assert_eq!(first_non_empty([None, Some("")]), None);
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_normalize_never_panics(title in ".*", body in ".*") {
            let normalized = normalize(&title, &body);
            prop_assert!(!normalized.clean_title.is_empty());
            prop_assert_eq!(
                normalized.word_count,
                normalized.clean_content.split_whitespace().count()
            );
        }

        #[test]
        fn test_normalize_html_output_has_no_tags(words in proptest::collection::vec("[a-z]{1,8}", 1..40)) {
            let html = format!("<div><p>{}</p><script>bad()</script></div>", words.join(" "));
            let normalized = normalize("t", &html);
            prop_assert!(!normalized.clean_content.contains("<p>"));
            prop_assert!(!normalized.clean_content.contains("bad()"));
            prop_assert_eq!(normalized.word_count, words.len());
        }
    }
}
