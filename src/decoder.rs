//! Decoder for the script-wrapped partial responses returned by the catalog
//! navigation endpoints.
//!
//! The year and model endpoints do not return HTML or JSON. They return a
//! short script that injects an escaped markup string into the page:
//!
//! ```text
//! $("#year_id").html("<a href=\"remote:\/get_model_by_make_year\/192\">2025<\/a>");
//! ```
//!
//! [`decode_partial`] recovers the markup; [`parse_year_index`] and
//! [`parse_model_index`] turn the decoded anchors into ordered `id -> label`
//! indexes.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::warn;

use crate::html_utils::{element_text, trailing_segment};

/// Path marker carried by every anchor of a decoded year list
pub const YEAR_PATH_MARKER: &str = "/get_model_by_make_year/";

/// Path marker carried by every anchor of a decoded model list
pub const MODEL_PATH_MARKER: &str = "/applications/";

/// Ordered `id -> label` pairs in the order the server listed them
pub type LinkIndex = Vec<(u32, String)>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no markup injection call found in partial response (starts with: {preview:?})")]
    NoInjection { preview: String },
}

lazy_static! {
    /// Markup-injection call with a double-quoted argument; escape-aware and
    /// non-greedy so only the first call's argument is captured.
    static ref INJECTION_CALL: Regex = Regex::new(
        r#"(?s)\.(?:html|append|prepend|replaceWith|before|after)\(\s*"((?:[^"\\]|\\.)*?)"\s*\)"#
    ).expect("Invalid injection call regex");

    static ref ANCHOR_SELECTOR: Selector = Selector::parse("a[href]").expect("Invalid anchor selector");
}

/// Extract the markup injected by a partial response.
///
/// Fails with [`DecodeError::NoInjection`] when the body holds no injection
/// call, which usually means the server answered with something else (an
/// error page, a redirect body, an empty response).
pub fn decode_partial(body: &str) -> Result<String, DecodeError> {
    let captures = INJECTION_CALL
        .captures(body)
        .ok_or_else(|| DecodeError::NoInjection {
            preview: body.chars().take(80).collect(),
        })?;
    let escaped = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    Ok(unescape_js(escaped))
}

/// Best-effort variant of [`decode_partial`]
pub fn try_decode_partial(body: &str) -> Option<String> {
    decode_partial(body).ok()
}

/// Reverse JS string escaping in a single pass.
///
/// Handles `\"` and `\/` (what the server emits) plus `\\`, `\'`, `\n`,
/// `\r` and `\t`. Unknown escapes are kept verbatim.
fn unescape_js(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('/') => out.push('/'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a decoded year-list fragment into `year id -> year label`
pub fn parse_year_index(fragment: &str) -> LinkIndex {
    parse_link_index(fragment, YEAR_PATH_MARKER)
}

/// Parse a decoded model-list fragment into `application id -> model label`
pub fn parse_model_index(fragment: &str) -> LinkIndex {
    parse_link_index(fragment, MODEL_PATH_MARKER)
}

fn parse_link_index(fragment: &str, marker: &str) -> LinkIndex {
    let document = Html::parse_fragment(fragment);
    let mut index: LinkIndex = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(marker) {
            continue;
        }

        let segment = trailing_segment(href).unwrap_or_default();
        let id = match segment.parse::<u32>() {
            Ok(id) => id,
            Err(_) => {
                warn!(href, marker, "Skipping anchor with non-numeric id");
                continue;
            }
        };

        if index.iter().any(|(existing, _)| *existing == id) {
            continue;
        }
        index.push((id, element_text(&anchor)));
    }

    index
}
