//! Listing page parsing
//!
//! Turns a listing/index page into an ordered, deduplicated sequence of
//! candidate listings by applying an [`ExtractionRuleSet`].

use crate::rules::rule_set::{ExtractionRuleSet, SelectorRule};
use crate::url::{listing_key, resolve_href};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Titles shorter than this (in characters) are rejected
pub const MIN_TITLE_CHARS: usize = 3;

/// A candidate discovered on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub title: String,

    /// Absolute URL, resolved against the listing page
    pub url: String,

    /// Full text of the rule's content field, when it declares one
    pub raw_content: Option<String>,
}

impl Listing {
    /// Identity of this listing (normalized absolute URL)
    pub fn key(&self) -> String {
        listing_key(&self.url)
    }
}

/// What one matched element yields before filtering
struct Candidate {
    title: String,
    href: String,
    content: Option<String>,
}

/// Parses listing candidates out of a page
///
/// # Rule Evaluation
///
/// Rules are tried in order. The first rule whose selector matches at least
/// one element is committed and no later rule is consulted, even when every
/// one of its matches is rejected afterwards; in that case the result is
/// empty. Selectors that fail to parse count as "no match".
///
/// # Per-Element Processing
///
/// 1. Derive title and href (see [`SelectorRule`])
/// 2. Reject titles under [`MIN_TITLE_CHARS`] characters and empty hrefs
/// 3. Skip hrefs already accepted in this call (raw href comparison)
/// 4. Filters: `clean_title`, `should_skip`, `matches_keyword` (when a
///    keyword is set), `has_required_prefix`
/// 5. Resolve the href against `base_url`; unresolvable links are dropped
///
/// Output keeps document order.
///
/// # Example
///
/// ```
/// use listing_harvester::rules::{parse_listings, ExtractionRuleSet, SelectorRule};
/// use url::Url;
///
/// let html = r#"<ul><li><a href="/topic/1">FS: Sony A7</a></li></ul>"#;
/// let rules = ExtractionRuleSet::new(vec![SelectorRule::new("li a", "topic links")]);
/// let base = Url::parse("https://example.com/board/").unwrap();
///
/// let listings = parse_listings(html, &base, &rules);
/// assert_eq!(listings[0].url, "https://example.com/topic/1");
/// ```
pub fn parse_listings(content: &str, base_url: &Url, rules: &ExtractionRuleSet) -> Vec<Listing> {
    let document = Html::parse_document(content);

    for rule in rules.rules() {
        let selector = match Selector::parse(&rule.selector) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!("Skipping unparsable selector '{}': {}", rule.selector, e);
                continue;
            }
        };

        let matches: Vec<ElementRef> = document.select(&selector).collect();
        tracing::debug!(
            "Trying selector '{}' ({}): found {} items",
            rule.selector,
            rule.description,
            matches.len()
        );

        if matches.is_empty() {
            continue;
        }

        tracing::info!(
            "Using selector '{}' with {} items",
            rule.selector,
            matches.len()
        );
        let listings = collect_listings(&matches, rule, base_url, rules);
        tracing::info!("Parsed {} listings", listings.len());
        return listings;
    }

    tracing::info!("No listing rule matched");
    Vec::new()
}

fn collect_listings(
    matches: &[ElementRef],
    rule: &SelectorRule,
    base_url: &Url,
    rules: &ExtractionRuleSet,
) -> Vec<Listing> {
    let filter = rules.filter();
    let mut seen_hrefs: HashSet<String> = HashSet::new();
    let mut listings = Vec::new();

    for (index, element) in matches.iter().enumerate() {
        let Some(candidate) = read_candidate(element, index, rule) else {
            continue;
        };

        if candidate.title.chars().count() < MIN_TITLE_CHARS || candidate.href.is_empty() {
            continue;
        }

        if seen_hrefs.contains(&candidate.href) {
            continue;
        }

        let title = filter.clean_title(&candidate.title);

        if filter.should_skip(&title, &candidate.href) {
            continue;
        }

        if let Some(keyword) = rules.keyword() {
            if !filter.matches_keyword(&title, keyword) {
                continue;
            }
        }

        if !filter.has_required_prefix(&title) {
            continue;
        }

        let Some(url) = resolve_href(base_url, &candidate.href) else {
            tracing::debug!("Dropping unresolvable link '{}'", candidate.href);
            continue;
        };

        seen_hrefs.insert(candidate.href);
        tracing::debug!("Added: {}", truncate_chars(&title, 60));

        listings.push(Listing {
            title,
            url: url.to_string(),
            raw_content: candidate.content,
        });
    }

    listings
}

/// Reads title, href and inline content from one matched element
///
/// Returns `None` when a declared field has no match inside the element.
fn read_candidate(element: &ElementRef, index: usize, rule: &SelectorRule) -> Option<Candidate> {
    let mut fields: Vec<(&str, String)> = Vec::with_capacity(rule.fields.len());

    for field in &rule.fields {
        let selector = Selector::parse(&field.selector).ok()?;
        let value = element.select(&selector).next().map(|e| element_text(&e))?;
        fields.push((field.name.as_str(), value));
    }

    let title = match &rule.title_template {
        Some(template) => render_title(template, rule, &fields),
        None => element_text(element),
    };

    let href = find_href(element, index, rule);

    let content = rule.content_field.as_ref().and_then(|name| {
        fields
            .iter()
            .find(|(field, _)| *field == name.as_str())
            .map(|(_, value)| value.clone())
    });

    Some(Candidate {
        title,
        href,
        content,
    })
}

/// Link target: `link_selector`, the element's own `href`, the first
/// descendant link, then `fallback_href`
fn find_href(element: &ElementRef, index: usize, rule: &SelectorRule) -> String {
    let from_link_selector = rule
        .link_selector
        .as_ref()
        .and_then(|s| Selector::parse(s).ok())
        .and_then(|s| {
            element
                .select(&s)
                .find_map(|e| e.value().attr("href").map(str::to_string))
        });

    let from_descendant = || {
        Selector::parse("a[href]").ok().and_then(|s| {
            element
                .select(&s)
                .next()
                .and_then(|e| e.value().attr("href").map(str::to_string))
        })
    };

    from_link_selector
        .or_else(|| element.value().attr("href").map(str::to_string))
        .or_else(from_descendant)
        .or_else(|| {
            rule.fallback_href
                .as_ref()
                .map(|href| href.replace("{index}", &index.to_string()))
        })
        .map(|href| href.trim().to_string())
        .unwrap_or_default()
}

fn render_title(template: &str, rule: &SelectorRule, fields: &[(&str, String)]) -> String {
    let mut title = template.to_string();

    for (mapping, (name, value)) in rule.fields.iter().zip(fields) {
        let value = match mapping.max_chars {
            Some(limit) => truncate_chars(value, limit),
            None => value.clone(),
        };
        title = title.replace(&format!("{{{}}}", name), &value);
    }

    title.trim().to_string()
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
