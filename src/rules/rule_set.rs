//! Extraction rule sets
//!
//! A rule set is an ordered list of candidate selector rules plus the title
//! filter hooks applied to whatever the winning rule matched. Rules are tried
//! strictly in order and the first one whose selector matches at least one
//! element is committed; matches from later rules are never merged in.

use crate::ConfigError;
use scraper::Selector;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// A named value pulled out of a matched element by a sub-selector
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldMapping {
    /// Placeholder name used in `title-template` (`{name}`)
    pub name: String,

    /// CSS selector evaluated inside the matched element
    pub selector: String,

    /// Truncate the value to this many characters when rendering the title
    #[serde(default)]
    pub max_chars: Option<usize>,
}

/// One candidate rule of a rule set
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorRule {
    /// CSS selector for the listing elements
    pub selector: String,

    /// Human-readable note, only used in logs
    #[serde(default)]
    pub description: String,

    /// Sub-selector fields available to `title_template` and `content_field`
    #[serde(default)]
    pub fields: Vec<FieldMapping>,

    /// Title built from fields, e.g. `"{text}... - {author}"`
    #[serde(default)]
    pub title_template: Option<String>,

    /// Descendant element whose `href` is the link target
    #[serde(default)]
    pub link_selector: Option<String>,

    /// Link used when the element carries none; `{index}` is replaced by
    /// the element's position among the rule's matches
    #[serde(default)]
    pub fallback_href: Option<String>,

    /// Field whose full text is kept as the listing's inline content
    #[serde(default)]
    pub content_field: Option<String>,
}

impl SelectorRule {
    /// Creates a plain rule: title is the element text, link is its `href`
    pub fn new(selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            description: description.into(),
            fields: Vec::new(),
            title_template: None,
            link_selector: None,
            fallback_href: None,
            content_field: None,
        }
    }

    pub fn with_field(
        mut self,
        name: impl Into<String>,
        selector: impl Into<String>,
        max_chars: Option<usize>,
    ) -> Self {
        self.fields.push(FieldMapping {
            name: name.into(),
            selector: selector.into(),
            max_chars,
        });
        self
    }

    pub fn with_title_template(mut self, template: impl Into<String>) -> Self {
        self.title_template = Some(template.into());
        self
    }

    pub fn with_link_selector(mut self, selector: impl Into<String>) -> Self {
        self.link_selector = Some(selector.into());
        self
    }

    pub fn with_fallback_href(mut self, href: impl Into<String>) -> Self {
        self.fallback_href = Some(href.into());
        self
    }

    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = Some(field.into());
        self
    }

    /// Checks that every selector parses and every placeholder is declared
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_selector(&self.selector)?;

        for field in &self.fields {
            if field.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Field in rule '{}' has an empty name",
                    self.selector
                )));
            }
            check_selector(&field.selector)?;
        }

        if let Some(link) = &self.link_selector {
            check_selector(link)?;
        }

        if let Some(template) = &self.title_template {
            for placeholder in template_placeholders(template) {
                if !self.fields.iter().any(|f| f.name == placeholder) {
                    return Err(ConfigError::Validation(format!(
                        "Title template of rule '{}' uses undeclared field '{}'",
                        self.selector, placeholder
                    )));
                }
            }
        }

        if let Some(content) = &self.content_field {
            if !self.fields.iter().any(|f| &f.name == content) {
                return Err(ConfigError::Validation(format!(
                    "Content field '{}' of rule '{}' is not declared",
                    content, self.selector
                )));
            }
        }

        Ok(())
    }
}

/// Parses a selector, mapping failures to a configuration error
pub fn check_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Names between braces in a template, in order of appearance
fn template_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }

    names
}

/// Title predicates applied, in a fixed order, to every listing candidate
///
/// Order: `clean_title`, `should_skip`, `matches_keyword` (only when the
/// rule set has a keyword), `has_required_prefix`.
pub trait TitleFilter: Send + Sync {
    fn clean_title(&self, title: &str) -> String {
        title.to_string()
    }

    fn should_skip(&self, _title: &str, _href: &str) -> bool {
        false
    }

    fn matches_keyword(&self, title: &str, keyword: &str) -> bool {
        title.to_lowercase().contains(&keyword.to_lowercase())
    }

    fn has_required_prefix(&self, _title: &str) -> bool {
        true
    }
}

/// Accepts every candidate unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl TitleFilter for NoFilter {}

/// Title filter driven by configuration data
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConfiguredFilter {
    /// Substrings removed from titles before the other checks
    pub strip_patterns: Vec<String>,

    /// Titles dropped on exact match (navigation links and the like)
    pub skip_titles: Vec<String>,

    /// Drop titles made only of digits (pagination links)
    pub skip_numeric: bool,

    /// Keep only titles starting with one of these; empty keeps all
    pub required_prefixes: Vec<String>,
}

impl TitleFilter for ConfiguredFilter {
    fn clean_title(&self, title: &str) -> String {
        let mut cleaned = title.to_string();
        for pattern in self.strip_patterns.iter().filter(|p| !p.is_empty()) {
            cleaned = cleaned.replace(pattern.as_str(), "");
        }
        cleaned.trim().to_string()
    }

    fn should_skip(&self, title: &str, _href: &str) -> bool {
        if self.skip_titles.iter().any(|t| t == title) {
            return true;
        }

        self.skip_numeric && !title.is_empty() && title.chars().all(|c| c.is_ascii_digit())
    }

    fn has_required_prefix(&self, title: &str) -> bool {
        self.required_prefixes.is_empty()
            || self
                .required_prefixes
                .iter()
                .any(|prefix| title.starts_with(prefix.as_str()))
    }
}

/// Ordered rules plus filters
#[derive(Clone)]
pub struct ExtractionRuleSet {
    rules: Vec<SelectorRule>,
    filter: Arc<dyn TitleFilter>,
    keyword: Option<String>,
}

impl ExtractionRuleSet {
    /// Creates a rule set with no filtering
    pub fn new(rules: Vec<SelectorRule>) -> Self {
        Self {
            rules,
            filter: Arc::new(NoFilter),
            keyword: None,
        }
    }

    pub fn with_filter(mut self, filter: impl TitleFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Sets the keyword; blank keywords disable keyword filtering
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.keyword = if keyword.trim().is_empty() {
            None
        } else {
            Some(keyword)
        };
        self
    }

    pub fn rules(&self) -> &[SelectorRule] {
        &self.rules
    }

    pub fn filter(&self) -> &dyn TitleFilter {
        self.filter.as_ref()
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rejects empty rule sets and rules with broken selectors
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.is_empty() {
            return Err(ConfigError::Validation(
                "Listing rule set must contain at least one rule".to_string(),
            ));
        }

        for rule in &self.rules {
            rule.validate()?;
        }

        Ok(())
    }
}

impl fmt::Debug for ExtractionRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionRuleSet")
            .field("rules", &self.rules)
            .field("keyword", &self.keyword)
            .finish_non_exhaustive()
    }
}
