use ammonia::Builder;
use linkify::{LinkFinder, LinkKind};
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

use crate::normalizer::model::normalize_whitespace;

const MAX_LINKS: usize = 50;
const MAX_BOILERPLATE_LINE_CHARS: usize = 200;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "thead", "tfoot", "tr",
    "ul",
];

static HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(?:!doctype|html|head|body|div|p|br|table|tr|td|span|a|img|h[1-6]|ul|ol|li|strong|em|b|i|blockquote|section|article|font|center)\b[^>]*>",
    )
    .unwrap()
});

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static NOISE_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["script", "style", "head", "noscript"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static ONE_PX_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bwidth\s*[=:]\s*["']?\s*[01](?:px)?\b"#).unwrap());
static ONE_PX_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bheight\s*[=:]\s*["']?\s*[01](?:px)?\b"#).unwrap());
static TRACKING_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*["'][^"']*(?:/open\b|/track|pixel|beacon|/o\.gif|spacer\.gif)"#)
        .unwrap()
});

static INLINE_ATTRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(?:style|class|id)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static ZERO_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{200B}-\u{200D}\u{2060}\u{FEFF}\u{00AD}\u{034F}]").unwrap());

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#(x[0-9a-f]+|[0-9]+);").unwrap());
static NAMED_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&[a-zA-Z][a-zA-Z0-9]*;").unwrap());

static BOILERPLATE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(view (?:this (?:email|message|newsletter) |it )?(?:in|on) (?:your |a )?(?:web ?)?browser|view (?:this email )?online|\bunsubscribe\b|(?:update|manage) (?:your )?(?:email |subscription )?preferences|forward (?:this )?to a friend|you(?:'| a)re receiving this)",
    )
    .unwrap()
});

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Heuristic check for markup. Plain text skips HTML handling entirely.
pub fn looks_like_html(input: &str) -> bool {
    HTML_MARKER.is_match(input)
}

/// Convert an HTML payload into text, keeping block-level line breaks.
///
/// Never fails: if DOM rendering produces nothing while the markup still
/// contains text, a naive tag strip is used instead.
pub fn html_to_text(html: &str) -> String {
    let prepared = strip_noise(html);
    let sanitized = Builder::default().clean(&prepared).to_string();
    let rendered = render_text(&sanitized);

    if rendered.trim().is_empty() {
        let fallback = strip_tags(&prepared);
        if !fallback.trim().is_empty() {
            return fallback;
        }
    }
    rendered
}

/// Drop comments, script/style/head blocks, tracking pixels and inline
/// presentation attributes before the markup is sanitized.
pub fn strip_noise(html: &str) -> String {
    let mut html = COMMENT.replace_all(html, "").into_owned();
    for block in NOISE_BLOCKS.iter() {
        html = block.replace_all(&html, "").into_owned();
    }
    let html = IMG_TAG.replace_all(&html, |caps: &Captures| {
        if is_tracking_image(&caps[0]) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    INLINE_ATTRS.replace_all(&html, "").into_owned()
}

fn is_tracking_image(tag: &str) -> bool {
    (ONE_PX_WIDTH.is_match(tag) && ONE_PX_HEIGHT.is_match(tag)) || TRACKING_SRC.is_match(tag)
}

/// Naive fallback: replace every tag with a space.
pub fn strip_tags(html: &str) -> String {
    ANY_TAG.replace_all(html, " ").into_owned()
}

fn render_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len() / 2);
    write_children(fragment.root_element(), &mut out);
    out
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_inline(out, text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    match name {
        "br" => out.push('\n'),
        "hr" => out.push_str("\n\n"),
        "td" | "th" => {
            write_children(element, out);
            out.push(' ');
        }
        _ if BLOCK_TAGS.contains(&name) => {
            out.push('\n');
            write_children(element, out);
            out.push('\n');
        }
        _ => write_children(element, out),
    }
}

// Whitespace inside text nodes is not significant in HTML.
fn push_inline(out: &mut String, text: &str) {
    if text.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    let mut words = text.split_whitespace().peekable();
    let had_words = words.peek().is_some();
    while let Some(word) = words.next() {
        out.push_str(word);
        if words.peek().is_some() {
            out.push(' ');
        }
    }
    if had_words && text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// Final text cleanup shared by both HTML and plain-text inputs.
pub fn clean_text(text: &str) -> String {
    let text = ZERO_WIDTH.replace_all(text, "");
    let text = decode_entities(&text);

    let kept = text
        .lines()
        .filter(|line| !is_boilerplate_line(line))
        .collect::<Vec<_>>()
        .join("\n");

    normalize_whitespace(&kept)
}

fn is_boilerplate_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && line.chars().count() <= MAX_BOILERPLATE_LINE_CHARS
        && BOILERPLATE_LINE.is_match(line)
}

/// Decode the entities that carry meaning and strip the rest.
pub fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .filter(|c| !ZERO_WIDTH.is_match(c.encode_utf8(&mut [0; 4])))
            .map(String::from)
            .unwrap_or_default()
    });

    NAMED_ENTITY
        .replace_all(&text, |caps: &Captures| {
            let decoded = match &caps[0] {
                "&nbsp;" | "&ensp;" | "&emsp;" | "&thinsp;" => " ",
                "&amp;" => "&",
                "&lt;" => "<",
                "&gt;" => ">",
                "&quot;" => "\"",
                "&apos;" => "'",
                "&rsquo;" | "&lsquo;" => "'",
                "&rdquo;" | "&ldquo;" => "\"",
                "&mdash;" | "&ndash;" => "-",
                "&hellip;" => "...",
                _ => "",
            };
            decoded.to_string()
        })
        .into_owned()
}

/// Collect absolute http(s) links from a payload, preserving first-seen order.
pub fn extract_links(raw: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        let is_web = candidate.starts_with("http://") || candidate.starts_with("https://");
        if is_web && links.len() < MAX_LINKS && !links.iter().any(|l| l == candidate) {
            links.push(candidate.to_string());
        }
    };

    if looks_like_html(raw) {
        let document = Html::parse_document(raw);
        for anchor in document.select(&ANCHOR) {
            if let Some(href) = anchor.value().attr("href") {
                push(href);
            }
        }
    }

    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    for link in finder.links(&strip_tags(raw)) {
        push(link.as_str());
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_html_vs_plain_text() {
        assert!(looks_like_html("<p>Hello</p>"));
        assert!(looks_like_html("<DIV class=\"x\">Hi</DIV>"));
        assert!(!looks_like_html("Plain text with a < sign and 3 > 2"));
    }

    #[test]
    fn test_removes_script_style_head_and_comments() {
        let html = r#"<html><head><title>Ignored title</title></head><body>
            <!-- hidden comment -->
            <style>p { color: red }</style>
            <p>Visible text</p>
            <script>alert('x')</script>
        </body></html>"#;
        let text = clean_text(&html_to_text(html));
        assert_eq!(text, "Visible text");
    }

    #[test]
    fn test_strips_tracking_pixels_and_inline_attributes() {
        let html = r#"<p class="lead" style="color:red" id="intro">Hi</p><img src="https://t.example.com/o.gif" width="1" height="1"><img src="https://cdn.example.com/hero.png" width="600">"#;
        let stripped = strip_noise(html);
        assert!(!stripped.contains("o.gif"));
        assert!(stripped.contains("hero.png"));
        assert!(!stripped.contains("class="));
        assert!(!stripped.contains("style="));
        assert!(!stripped.contains("id="));
    }

    #[test]
    fn test_block_elements_become_line_breaks() {
        let html = "<h1>Title</h1><p>First <b>bold</b> paragraph.</p><ul><li>One</li><li>Two</li></ul>Line<br>break";
        let text = clean_text(&html_to_text(html));
        assert_eq!(text, "Title\n\nFirst bold paragraph.\n\nOne\n\nTwo\n\nLine\nbreak");
    }

    #[test]
    fn test_clean_text_strips_zero_width_and_entities() {
        let text = "Caf\u{200B}e &amp; bar&nbsp;&copy; &#8217;s &#x41;";
        assert_eq!(clean_text(text), "Cafe & bar \u{2019}s A");
    }

    #[test]
    fn test_clean_text_drops_boilerplate_lines() {
        let text = "View this email in your browser\nReal content here.\n\nUnsubscribe | Update your preferences";
        assert_eq!(clean_text(text), "Real content here.");
    }

    #[test]
    fn test_long_lines_mentioning_unsubscribe_are_kept() {
        let long = format!("{} unsubscribe {}", "word ".repeat(30), "more ".repeat(30));
        assert!(clean_text(&long).contains("unsubscribe"));
    }

    #[test]
    fn test_fallback_strip_when_render_is_empty() {
        assert_eq!(strip_tags("<x-custom>hello</x-custom>").trim(), "hello");
        let text = html_to_text("<x-custom>hello</x-custom>");
        assert!(text.contains("hello"));
    }

    #[test]
    fn test_extract_links_from_html_and_text() {
        let html = r#"<p><a href="https://example.com/a">A</a> and https://example.com/b</p><a href="/relative">rel</a><a href="https://example.com/a">dup</a>"#;
        let links = extract_links(html);
        assert_eq!(links, vec!["https://example.com/a", "https://example.com/b"]);
    }
}
