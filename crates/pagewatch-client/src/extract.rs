//! Plain-text extraction from HTML.
//!
//! Shared by the static and browser strategies so both produce the same
//! content for the same DOM.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Elements dropped before any text is read.
const NOISE_SELECTOR: &str = r#"script, style, noscript, iframe, nav, footer, [class*="ad"], [class*="advertisement"], [id*="ad"]"#;

/// Candidates for the main content area, tried in document order.
const MAIN_CONTENT_SELECTOR: &str = "main, article, .content, .main, #content, #main";

static NOISE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(NOISE_SELECTOR).expect("valid noise selector"));
static MAIN_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(MAIN_CONTENT_SELECTOR).expect("valid main selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid body selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid blank line regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub content: String,
    pub title: String,
}

/// Strip noise elements and return the normalized text of the monitored area.
///
/// With a selector, the first matching element is used; an invalid selector
/// or no match yields empty content. Without one, the main content area is
/// used, falling back to `<body>`.
pub fn extract_page(html: &str, selector: Option<&str>) -> ExtractedPage {
    let mut document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    remove_noise(&mut document);

    let raw = match selector.map(str::trim).filter(|s| !s.is_empty()) {
        Some(selector) => match Selector::parse(selector) {
            Ok(selector) => first_text(&document, &selector).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(%selector, error = ?e, "Invalid CSS selector");
                String::new()
            }
        },
        None => first_text(&document, &MAIN_CONTENT)
            .or_else(|| first_text(&document, &BODY))
            .unwrap_or_default(),
    };

    ExtractedPage {
        content: normalize_whitespace(&raw),
        title,
    }
}

/// Collapse runs of spaces/tabs, squeeze blank lines and trim.
pub fn normalize_whitespace(text: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(text.trim(), " ");
    BLANK_LINES.replace_all(&text, "\n").trim().to_string()
}

fn remove_noise(document: &mut Html) {
    let ids: Vec<_> = document.select(&NOISE).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}
