use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const WORDS_PER_MINUTE: usize = 200;

static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());
static BLANK_LINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContent {
    pub clean_title: String,
    pub clean_content: String,
    pub word_count: usize,
    pub estimated_read_minutes: u32,
}

/// Collapse runs of spaces/tabs to one space, trim every line and squeeze
/// consecutive blank lines into a single paragraph break.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let spaced = SPACE_RUN.replace_all(&text, " ");

    let trimmed_lines = spaced
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINE_RUN
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn estimate_read_minutes(words: usize) -> u32 {
    words.div_ceil(WORDS_PER_MINUTE) as u32
}
