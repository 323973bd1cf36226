//! Small markup helpers shared by the decoder and the normalizer.

use scraper::ElementRef;

/// Collapse runs of whitespace (including `&nbsp;`) into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of an element with whitespace collapsed
pub fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Last non-empty path segment of an href, ignoring query and fragment.
///
/// `remote:/get_model_by_make_year/192` -> `192`
pub fn trailing_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?;
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}
