//! Specification normalizer for catalog list pages and item detail pages.
//!
//! List pages group items into panels, one panel per category:
//!
//! ```html
//! <div class="panel">
//!   <div class="panel-heading">Radiators</div>
//!   <div class="product-item">
//!     <a class="item-number" href="/items/3951">3951</a>
//!     <h4 class="item-name">3951 - Radiator</h4>
//!     <img class="thumb primary" src="/img/3951.jpg" alt="3951">
//!     <span class="in-stock">In Stock</span>
//!     <table><tr><td>Aspiration: Turbocharged</td></tr></table>
//!   </div>
//! </div>
//! ```
//!
//! Detail pages carry a couple dozen tables in four incompatible layouts.
//! Every row is run through an ordered chain of [`RowShape`] detectors and
//! the first match decides how the cells become key/value pairs.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::html_utils::{collapse_whitespace, element_text, trailing_segment};
use crate::models::{DetailRecord, PartImage, PartRecord, ReferenceNumber};

/// Specification key that carries the technical notes of an item
pub const TECH_NOTE_KEY: &str = "Tech Note";

const COMPATIBILITY_HEADERS: [&str; 2] = ["Make", "Model"];
const REFERENCE_NUMBER_HEADER: &str = "Reference Number";
const REFERENCE_NAME_HEADER: &str = "Reference Name";

lazy_static! {
    static ref ITEM_SELECTOR: Selector = Selector::parse(".product-item").expect("Invalid item selector");
    static ref ITEM_ID_SELECTOR: Selector = Selector::parse(r#"a[href*="/items/"]"#).expect("Invalid item id selector");
    static ref ITEM_NAME_SELECTOR: Selector = Selector::parse(".item-name, h4").expect("Invalid item name selector");
    static ref PRIMARY_IMAGE_SELECTOR: Selector = Selector::parse("img.primary").expect("Invalid image selector");
    static ref IN_STOCK_SELECTOR: Selector = Selector::parse(".in-stock").expect("Invalid stock selector");
    static ref PANEL_HEADING_SELECTOR: Selector = Selector::parse(".panel-heading").expect("Invalid panel selector");
    static ref CELL_SELECTOR: Selector = Selector::parse("td").expect("Invalid cell selector");
    static ref TABLE_SELECTOR: Selector = Selector::parse("table").expect("Invalid table selector");
    static ref ROW_SELECTOR: Selector = Selector::parse("tr").expect("Invalid row selector");
    static ref ROW_CELL_SELECTOR: Selector = Selector::parse("th, td").expect("Invalid row cell selector");
    static ref DESCRIPTION_SELECTOR: Selector = Selector::parse(".item-description").expect("Invalid description selector");
}

/// A list item that cannot become a part record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("item has no identifier anchor")]
    MissingIdentifier,

    #[error("item {sku} has no name heading")]
    MissingName { sku: String },
}

/// Turns catalog markup into part-record fields.
#[derive(Debug, Clone)]
pub struct Normalizer {
    sku_prefix: String,
}

impl Normalizer {
    pub fn new(sku_prefix: impl Into<String>) -> Self {
        Self {
            sku_prefix: sku_prefix.into().to_uppercase(),
        }
    }

    /// Canonical sku: uppercase, vendor-prefixed exactly once
    pub fn canonical_sku(&self, raw: &str) -> String {
        let upper = raw.trim().to_uppercase();
        if upper.starts_with(&self.sku_prefix) {
            upper
        } else {
            format!("{}{}", self.sku_prefix, upper)
        }
    }

    /// Extract every item of a rendered list page.
    ///
    /// Failures are per item; one broken item never hides its neighbours.
    pub fn extract_list_page(&self, html: &str) -> Vec<Result<PartRecord, ExtractionError>> {
        let document = Html::parse_document(html);
        document
            .select(&ITEM_SELECTOR)
            .map(|item| self.extract_list_item(item))
            .collect()
    }

    /// Extract a single list-item fragment outside of its page
    pub fn extract_list_fragment(&self, fragment: &str) -> Result<PartRecord, ExtractionError> {
        let document = Html::parse_fragment(fragment);
        match document.select(&ITEM_SELECTOR).next() {
            Some(item) => self.extract_list_item(item),
            None => self.extract_list_item(document.root_element()),
        }
    }

    fn extract_list_item(&self, item: ElementRef<'_>) -> Result<PartRecord, ExtractionError> {
        let anchor = item
            .select(&ITEM_ID_SELECTOR)
            .next()
            .ok_or(ExtractionError::MissingIdentifier)?;
        let raw_id = {
            let text = element_text(&anchor);
            if text.is_empty() {
                anchor
                    .value()
                    .attr("href")
                    .and_then(trailing_segment)
                    .unwrap_or_default()
                    .to_string()
            } else {
                text
            }
        };
        if raw_id.is_empty() {
            return Err(ExtractionError::MissingIdentifier);
        }
        let sku = self.canonical_sku(&raw_id);

        let heading = item
            .select(&ITEM_NAME_SELECTOR)
            .next()
            .map(|h| element_text(&h))
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ExtractionError::MissingName { sku: sku.clone() })?;

        let mut part = PartRecord::new(sku, name_from_heading(&heading));
        part.category = enclosing_category(item);
        part.in_stock = item.select(&IN_STOCK_SELECTOR).next().is_some();

        if let Some(image) = primary_image(item) {
            part.images.push(image);
        }

        for cell in item.select(&CELL_SELECTOR) {
            let text = element_text(&cell);
            if let Some((key, value)) = text.split_once(": ") {
                let key = clean_key(key);
                if !key.is_empty() {
                    part.specifications
                        .entry(key)
                        .or_insert_with(|| value.trim().to_string());
                }
            }
        }

        Ok(part)
    }
}

/// Name part of an item heading such as `3951 - Radiator`.
///
/// Headings without the ` - ` separator are used whole. Whitespace is
/// collapsed before splitting, so `3951- Radiator` stays `3951- Radiator`.
pub fn name_from_heading(heading: &str) -> String {
    let text = collapse_whitespace(heading);
    match text.split_once(" - ") {
        Some((_, name)) => name.trim().to_string(),
        None => text,
    }
}

fn enclosing_category(item: ElementRef<'_>) -> Option<String> {
    item.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().has_class("panel", scraper::CaseSensitivity::AsciiCaseInsensitive))
        .and_then(|panel| panel.select(&PANEL_HEADING_SELECTOR).next())
        .map(|heading| element_text(&heading))
        .filter(|text| !text.is_empty())
}

fn primary_image(item: ElementRef<'_>) -> Option<PartImage> {
    let img = item.select(&PRIMARY_IMAGE_SELECTOR).next()?;
    let attrs = img.value();
    let url = attrs
        .attr("src")
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .or_else(|| attrs.attr("data-src").map(str::trim))
        .filter(|src| !src.is_empty())?;
    Some(PartImage {
        url: url.to_string(),
        alt: attrs
            .attr("alt")
            .map(collapse_whitespace)
            .filter(|alt| !alt.is_empty()),
        primary: true,
    })
}

fn clean_key(key: &str) -> String {
    key.trim().trim_end_matches(':').trim().to_string()
}

/// How one table row encodes its specification pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// `[spacer, key, value]` repeated; cell count is a positive multiple of 3
    Triplets,
    /// `[key, value]`
    Pair,
    /// a single `Key: Value` cell
    ColonCell,
}

impl RowShape {
    /// Detection order; the first matching shape wins
    const CHAIN: [RowShape; 3] = [RowShape::Triplets, RowShape::Pair, RowShape::ColonCell];

    pub fn detect(cells: &[String]) -> Option<RowShape> {
        Self::CHAIN.into_iter().find(|shape| shape.matches(cells))
    }

    fn matches(self, cells: &[String]) -> bool {
        match self {
            RowShape::Triplets => !cells.is_empty() && cells.len() % 3 == 0,
            RowShape::Pair => cells.len() == 2,
            RowShape::ColonCell => cells.len() == 1 && cells[0].contains(": "),
        }
    }

    /// Raw `(key, value)` pairs; keys are not cleaned yet
    pub fn pairs(self, cells: &[String]) -> Vec<(String, String)> {
        match self {
            RowShape::Triplets => cells
                .chunks(3)
                .map(|chunk| (chunk[1].clone(), chunk[2].clone()))
                .collect(),
            RowShape::Pair => vec![(cells[0].clone(), cells[1].clone())],
            RowShape::ColonCell => cells[0]
                .split_once(": ")
                .map(|(k, v)| vec![(k.to_string(), v.to_string())])
                .unwrap_or_default(),
        }
    }
}

/// What a detail-page table holds, judged from its header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Compatibility,
    References,
    Specifications,
}

impl TableKind {
    fn classify(header: &[String]) -> TableKind {
        let has = |name: &str| header.iter().any(|cell| clean_key(cell) == name);
        if COMPATIBILITY_HEADERS.iter().any(|name| has(*name)) {
            TableKind::Compatibility
        } else if has(REFERENCE_NUMBER_HEADER) || has(REFERENCE_NAME_HEADER) {
            TableKind::References
        } else {
            TableKind::Specifications
        }
    }
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.select(&ROW_CELL_SELECTOR)
        .map(|cell| element_text(&cell))
        .collect()
}

/// Extract specifications, description, tech notes and reference numbers
/// from a rendered detail page.
pub fn extract_detail(html: &str) -> DetailRecord {
    let document = Html::parse_document(html);
    let mut specifications: BTreeMap<String, String> = BTreeMap::new();
    let mut reference_numbers: Option<Vec<ReferenceNumber>> = None;

    for table in document.select(&TABLE_SELECTOR) {
        let rows: Vec<Vec<String>> = table.select(&ROW_SELECTOR).map(row_cells).collect();
        let Some(header) = rows.first() else {
            continue;
        };

        match TableKind::classify(header) {
            TableKind::Compatibility => continue,
            TableKind::References => {
                if reference_numbers.is_none() {
                    reference_numbers = reference_rows(&rows);
                }
                continue;
            }
            TableKind::Specifications => {}
        }

        for cells in &rows {
            let Some(shape) = RowShape::detect(cells) else {
                continue;
            };
            for (key, value) in shape.pairs(cells) {
                let key = clean_key(&key);
                if key.is_empty() {
                    continue;
                }
                // First occurrence wins across the whole page
                specifications
                    .entry(key)
                    .or_insert_with(|| value.trim().to_string());
            }
        }
    }

    let tech_notes = specifications
        .remove(TECH_NOTE_KEY)
        .filter(|note| !note.is_empty());

    let description = document
        .select(&DESCRIPTION_SELECTOR)
        .next()
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty());

    DetailRecord {
        specifications,
        description,
        tech_notes,
        reference_numbers: reference_numbers.unwrap_or_default(),
    }
}

/// Reference rows of a table whose header names both reference columns.
/// Returns `None` for tables that only carry one of the two.
fn reference_rows(rows: &[Vec<String>]) -> Option<Vec<ReferenceNumber>> {
    let header = rows.first()?;
    let column = |name: &str| header.iter().position(|cell| clean_key(cell) == name);
    let number_col = column(REFERENCE_NUMBER_HEADER)?;
    let name_col = column(REFERENCE_NAME_HEADER)?;

    let references = rows[1..]
        .iter()
        .filter_map(|cells| {
            let number = cells.get(number_col).filter(|v| !v.is_empty())?;
            let name = cells.get(name_col).filter(|v| !v.is_empty())?;
            Some(ReferenceNumber {
                number: number.clone(),
                name: name.clone(),
            })
        })
        .collect();
    Some(references)
}
