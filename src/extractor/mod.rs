//! HTML listing extraction
//!
//! Turns a raw listing page into product records. Every field is extracted
//! independently; a missing or malformed field falls back to its default and
//! never affects the other cards on the page.

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use tracing::{debug, warn};

use crate::models::Record;

/// Title used when a card has no usable title element
pub const DEFAULT_TITLE: &str = "No title";

/// Directory that image paths are rooted in
pub const IMAGE_DIR: &str = "images";

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];

/// CSS selectors for the parts of a product listing
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Container selector for individual product cards
    pub product_card: String,
    /// Title selector within a card
    pub title: String,
    /// Price selector within a card
    pub price: String,
    /// Image selector within a card
    pub image: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            product_card: r#"div[class*="product"]"#.to_string(),
            title: "h3.product-title".to_string(),
            price: "span.product-price".to_string(),
            image: "img".to_string(),
        }
    }
}

/// Parsed selectors, ready to run against any number of pages
#[derive(Debug, Clone)]
pub struct Extractor {
    card: Selector,
    title: Selector,
    price: Selector,
    image: Selector,
}

impl Extractor {
    pub fn new(selectors: &SiteSelectors) -> Result<Self> {
        Ok(Self {
            card: parse_selector("product card", &selectors.product_card)?,
            title: parse_selector("title", &selectors.title)?,
            price: parse_selector("price", &selectors.price)?,
            image: parse_selector("image", &selectors.image)?,
        })
    }

    /// Extracts all product cards from `raw`, in document order
    pub fn extract(&self, raw: &str) -> Vec<Record> {
        let document = Html::parse_document(raw);

        let records: Vec<Record> = self
            .cards(&document)
            .into_iter()
            .map(|card| self.extract_card(card))
            .collect();

        debug!("Extracted {} product cards", records.len());
        records
    }

    /// Narrows card selector matches down to actual cards
    ///
    /// A match holding two or more titled matches is a listing wrapper, and a
    /// match inside an accepted card is part of that card.
    fn cards<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let matches: Vec<ElementRef<'a>> = document.select(&self.card).collect();
        let mut cards: Vec<ElementRef<'a>> = Vec::new();

        for candidate in &matches {
            if cards.iter().any(|card| contains(card, candidate)) {
                continue;
            }

            let titled = matches
                .iter()
                .filter(|other| contains(candidate, other))
                .filter(|other| other.select(&self.title).next().is_some())
                .count();
            if titled >= 2 {
                continue;
            }

            cards.push(*candidate);
        }

        cards
    }

    fn extract_card(&self, card: ElementRef<'_>) -> Record {
        let title = card
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let price = card.select(&self.price).next().map_or(0.0, |el| {
            let text = el.text().collect::<String>();
            parse_price(&text).unwrap_or_else(|| {
                warn!("Malformed price {:?} for product {:?}, using 0", text.trim(), title);
                0.0
            })
        });

        let image_url = card
            .select(&self.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default();

        Record {
            title,
            price,
            image_path: image_path(image_url),
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        // The built-in selectors are known to be valid
        Self::new(&SiteSelectors::default()).expect("default selectors are valid")
    }
}

fn contains<'a>(outer: &ElementRef<'a>, inner: &ElementRef<'a>) -> bool {
    inner
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor == *outer)
}

fn parse_selector(name: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| anyhow!("Failed to parse {} selector {:?}: {:?}", name, selector, e))
}

/// Strips currency symbols, thousands separators and whitespace, then parses
///
/// Returns `None` for anything that is not a finite, non-negative number.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();

    let cleaned = if cleaned.is_empty() { "0" } else { cleaned.as_str() };

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price >= 0.0)
}

/// Maps an image URL to `images/<final path segment>`, or `""` without an image
pub fn image_path(image_url: &str) -> String {
    let without_query = image_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let name = without_query.rsplit('/').next().unwrap_or_default();

    if name.is_empty() {
        return String::new();
    }

    Path::new(IMAGE_DIR).join(name).to_string_lossy().into_owned()
}
