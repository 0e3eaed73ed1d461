//! Detail page extraction
//!
//! Pulls a price and a cleaned-up description out of a single detail page.
//! Nothing here fails: a field that cannot be found is reported as
//! [`NOT_AVAILABLE`].

use crate::rules::rule_set::check_selector;
use crate::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

/// Value reported for a field that was not found
pub const NOT_AVAILABLE: &str = "N/A";

/// Details text recorded for a listing whose page could not be fetched
pub const FETCH_ERROR_DETAILS: &str = "Error fetching details";

/// `$`, digits with optional thousands separators, optional cents
static PRICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[\d,]+(?:\.\d{2})?").expect("price pattern is valid"));

static PRICE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)price:").expect("price label pattern is valid"));

/// Tunables of the detail extractor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DetailRules {
    /// Candidate selectors for the description, tried in order
    pub selectors: Vec<String>,

    /// An element must have more than this many characters of text
    pub min_text_length: usize,

    /// Number of description lines kept
    pub max_lines: usize,

    /// Lines containing any of these (case-insensitive) are dropped
    pub junk_tokens: Vec<String>,

    /// Characters of raw content scanned by the fallback price search
    pub price_scan_chars: usize,

    /// Fallback prices must have an integer part above this
    pub min_fallback_price: u64,
}

impl Default for DetailRules {
    fn default() -> Self {
        Self {
            selectors: [
                "div.post_body",
                "td.alt1[id^='post']",
                "div[id^='post_message']",
                "div.item-description",
                "div.post-content",
                "div.message-content",
                "div.content",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_text_length: 100,
            max_lines: 15,
            junk_tokens: vec!["quote".to_string(), "edit".to_string(), "report".to_string()],
            price_scan_chars: 5000,
            min_fallback_price: 50,
        }
    }
}

impl DetailRules {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for selector in &self.selectors {
            check_selector(selector)?;
        }

        if self.max_lines == 0 {
            return Err(ConfigError::Validation(
                "detail max-lines must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Fields extracted from one detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDetails {
    pub price: String,
    pub details: String,
}

/// Extracts price and details from a detail page
///
/// # Price
///
/// 1. The first text node containing `Price:` (any case): the first currency
///    amount in its parent element's text
/// 2. Otherwise the first amount in the leading `price_scan_chars`
///    characters of the raw content whose integer part exceeds
///    `min_fallback_price`
/// 3. Otherwise [`NOT_AVAILABLE`]
///
/// # Details
///
/// The first element (selectors in order, matches in document order) with
/// more than `min_text_length` characters of text wins. Its non-blank lines
/// minus junk lines, at most `max_lines`, joined by newlines.
///
/// # Example
///
/// ```
/// use listing_harvester::rules::{extract_details, DetailRules};
///
/// let found = extract_details("Price: $1,234.50 great lens", "https://example.com/t/1", &DetailRules::default());
/// assert_eq!(found.price, "$1,234.50");
/// ```
pub fn extract_details(content: &str, url: &str, rules: &DetailRules) -> ExtractedDetails {
    let document = Html::parse_document(content);

    let price = labeled_price(&document)
        .or_else(|| scan_price(content, rules))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let details = extract_description(&document, rules).unwrap_or_else(|| NOT_AVAILABLE.to_string());

    tracing::debug!("Extracted details for {}: price={}", url, price);

    ExtractedDetails { price, details }
}

/// Amount next to the first `Price:` label
fn labeled_price(document: &Html) -> Option<String> {
    let label = document.tree.root().descendants().find(|node| {
        node.value()
            .as_text()
            .is_some_and(|text| PRICE_LABEL.is_match(text))
    })?;

    let parent = label.parent().and_then(ElementRef::wrap)?;
    let parent_text: String = parent.text().collect();

    PRICE_PATTERN
        .find(&parent_text)
        .map(|m| m.as_str().to_string())
}

/// First plausible amount in the leading part of raw content
///
/// Small amounts are usually shipping fees or unrelated numbers, hence the
/// `min_fallback_price` floor.
pub fn scan_price(content: &str, rules: &DetailRules) -> Option<String> {
    let end = content
        .char_indices()
        .nth(rules.price_scan_chars)
        .map(|(i, _)| i)
        .unwrap_or(content.len());

    PRICE_PATTERN
        .find_iter(&content[..end])
        .map(|m| m.as_str())
        .find(|amount| integer_part(amount).is_some_and(|value| value > rules.min_fallback_price))
        .map(str::to_string)
}

/// `"$1,234.50"` -> `1234`
fn integer_part(amount: &str) -> Option<u64> {
    amount
        .trim_start_matches('$')
        .replace(',', "")
        .split('.')
        .next()
        .and_then(|whole| whole.parse().ok())
}

fn extract_description(document: &Html, rules: &DetailRules) -> Option<String> {
    for selector_str in &rules.selectors {
        let selector = match Selector::parse(selector_str) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!("Skipping unparsable detail selector '{}': {}", selector_str, e);
                continue;
            }
        };

        for element in document.select(&selector) {
            let text: String = element.text().collect();
            let text = text.trim();

            if text.chars().count() > rules.min_text_length {
                return Some(clean_lines(text, rules));
            }
        }
    }

    None
}

fn clean_lines(text: &str, rules: &DetailRules) -> String {
    let junk: Vec<String> = rules.junk_tokens.iter().map(|t| t.to_lowercase()).collect();

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lowered = line.to_lowercase();
            !junk.iter().any(|token| lowered.contains(token.as_str()))
        })
        .take(rules.max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}
