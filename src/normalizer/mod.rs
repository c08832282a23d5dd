pub mod cleaner;
pub mod language;
pub mod model;
pub mod title;

#[cfg(test)]
mod tests;

pub use model::{NormalizedContent, estimate_read_minutes, normalize_whitespace, word_count};
pub use title::clean_title;

/// Turn a raw title and an HTML or plain-text payload into comparable text.
pub fn normalize(title: &str, html_or_text: &str) -> NormalizedContent {
    // 1. Markup to text; plain text bypasses HTML handling
    let text = if cleaner::looks_like_html(html_or_text) {
        cleaner::html_to_text(html_or_text)
    } else {
        html_or_text.to_string()
    };

    // 2. Zero-width characters, entities, boilerplate lines, whitespace
    let clean_content = cleaner::clean_text(&text);

    // 3. Title and reading statistics
    let clean_title = clean_title(&cleaner::decode_entities(title));
    let words = word_count(&clean_content);

    NormalizedContent {
        clean_title,
        clean_content,
        word_count: words,
        estimated_read_minutes: estimate_read_minutes(words),
    }
}

/// First candidate that is non-empty after trimming, in priority order.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|candidate| !candidate.trim().is_empty())
}
