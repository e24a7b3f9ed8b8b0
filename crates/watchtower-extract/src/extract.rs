//! HTML → normalized text.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use watchtower_core::error::{Result, WatchtowerError};

/// Selectors tried in order when a price tracker has none configured.
pub const PRICE_SELECTORS: &[&str] = &[
    ".price",
    "#priceblock_dealprice",
    "#priceblock_ourprice",
    ".a-price-whole",
    "[data-price]",
    ".product-price",
];

static PRICE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9,]*\.?[0-9]*").expect("static regex"));

/// Elements whose text never counts as page content.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Text of the first element matching `selector`, whitespace-normalized.
///
/// An invalid selector or a selector that matches nothing is an
/// [`WatchtowerError::Extraction`]; a matched but empty element yields `""`.
pub fn extract_text(html: &str, selector: &str) -> Result<String> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let element = document.select(&parsed).next().ok_or_else(|| {
        WatchtowerError::Extraction(format!("selector '{selector}' matched nothing"))
    })?;
    Ok(normalize_whitespace(&visible_text(element)))
}

/// First price found under `selector`, or under [`PRICE_SELECTORS`] when none is given.
pub fn extract_price(html: &str, selector: Option<&str>) -> Result<f64> {
    let document = Html::parse_document(html);
    let candidates: Vec<&str> = match selector {
        Some(s) => vec![s],
        None => PRICE_SELECTORS.to_vec(),
    };

    for candidate in &candidates {
        let parsed = parse_selector(candidate)?;
        let Some(element) = document.select(&parsed).next() else {
            continue;
        };
        // data-price attributes carry the cleanest value when present.
        let raw = element
            .value()
            .attr("data-price")
            .map(str::to_owned)
            .unwrap_or_else(|| visible_text(element));
        if let Some(price) = parse_price(&raw) {
            return Ok(price);
        }
    }

    Err(WatchtowerError::Extraction(format!(
        "no price found using selector(s): {}",
        candidates.join(", ")
    )))
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        WatchtowerError::Extraction(format!("invalid selector '{selector}': {e}"))
    })
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    parts.concat()
}

fn parse_price(raw: &str) -> Option<f64> {
    let token = PRICE_TOKEN.find(raw)?.as_str().replace(',', "");
    token.trim_end_matches('.').parse().ok()
}
