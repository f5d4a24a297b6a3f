//! Field extraction over a loaded DOM.
//!
//! Every function here is pure: it takes a parsed [`Html`] document (as
//! handed over by [`crate::browser::Page::evaluate`]) and reads text out of
//! it. Candidate selectors are tried strictly in priority order; the first
//! candidate that yields non-empty text wins, regardless of where its node
//! sits in the document.

use crate::utils::{normalize_block, normalize_inline};
use scraper::{ElementRef, Html, Selector};
use tracing::{trace, warn};

/// Subtrees that never count towards body text.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

/// Elements that start a new line in extracted body text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote", "pre", "table", "tr", "figure", "figcaption", "dd", "dt",
];

/// The logical field a selector list is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    Body,
    Author,
    Date,
}

/// Walk `candidates` in order and return the first non-empty match.
///
/// For each candidate only the first matching node is read. `min_length`
/// (in characters, after trimming) rejects matches that are too short, e.g.
/// a teaser paragraph standing in for the article body. `None` means no
/// candidate matched; whether that is fatal is the caller's decision.
pub fn extract_field(
    doc: &Html,
    kind: FieldKind,
    candidates: &[String],
    min_length: Option<usize>,
) -> Option<String> {
    for candidate in candidates {
        let selector = match Selector::parse(candidate) {
            Ok(selector) => selector,
            Err(e) => {
                warn!(selector = %candidate, error = ?e, "Skipping unparsable selector");
                continue;
            }
        };

        let Some(element) = doc.select(&selector).next() else {
            continue;
        };

        let value = read_field(element, kind);
        let len = value.chars().count();
        if len == 0 || min_length.is_some_and(|min| len < min) {
            trace!(selector = %candidate, len, "Candidate too short");
            continue;
        }

        trace!(selector = %candidate, ?kind, len, "Candidate matched");
        return Some(value);
    }
    None
}

/// Text of the whole `<body>` with chrome subtrees removed.
///
/// Last-resort body for pages none of the candidate selectors understand.
pub fn document_body_text(doc: &Html) -> Option<String> {
    let selector = Selector::parse("body").ok()?;
    let body = doc.select(&selector).next()?;
    let text = body_text(body);
    (!text.is_empty()).then_some(text)
}

fn read_field(element: ElementRef<'_>, kind: FieldKind) -> String {
    let el = element.value();

    if kind == FieldKind::Date {
        // machine-readable values beat the display string
        for attr in ["datetime", "content"] {
            if let Some(value) = el.attr(attr) {
                let value = normalize_inline(value);
                if !value.is_empty() {
                    return value;
                }
            }
        }
    }

    if el.name() == "meta" {
        return el.attr("content").map(normalize_inline).unwrap_or_default();
    }

    match kind {
        FieldKind::Body => body_text(element),
        _ => normalize_inline(&element.text().collect::<String>()),
    }
}

/// Readable text of `element`, skipping [`CHROME_TAGS`] descendants and
/// keeping block boundaries as line breaks.
pub fn body_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    normalize_block(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.text);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_el.value().name();
        if CHROME_TAGS.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push('\n');
            continue;
        }
        let block = BLOCK_TAGS.contains(&name);
        if block {
            out.push('\n');
        }
        collect_text(child_el, out);
        if block {
            out.push('\n');
        }
    }
}
