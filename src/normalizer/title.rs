use regex::Regex;
use std::sync::LazyLock;

pub const UNTITLED: &str = "Untitled";

static REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:re|fwd?)\s*(?:\[\d+\])?\s*:\s*").unwrap());
static BRACKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static LEADING_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:#\d+|\d+[.)])\s*[:\-]?\s*").unwrap());

/// Strip reply/forward prefixes, bracketed tags and leading ordinals, then
/// collapse whitespace. Falls back to [`UNTITLED`] when nothing is left.
pub fn clean_title(title: &str) -> String {
    let mut current = title.to_string();
    // "Fwd: RE: [list] 3. Title" needs several passes.
    loop {
        let next = REPLY_PREFIX.replace(&current, "");
        let next = BRACKET_TAG.replace_all(&next, " ");
        let next = LEADING_ORDINAL.replace(next.trim_start(), "");
        let next = next.trim().to_string();
        if next == current {
            break;
        }
        current = next;
    }

    let collapsed = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        UNTITLED.to_string()
    } else {
        collapsed
    }
}
