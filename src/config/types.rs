use crate::crawler::Pagination;
use crate::output::ReportFormat;
use crate::rules::{ConfiguredFilter, DetailRules, ExtractionRuleSet, SelectorRule};
use serde::Deserialize;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub browser: Option<BrowserConfig>,
    pub listing: ListingConfig,
    #[serde(default)]
    pub detail: DetailRules,
    #[serde(default)]
    pub output: OutputConfig,
}

/// HTTP fetching and retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Attempts per URL, including the first one
    pub max_retries: u32,

    /// Backoff unit; attempt `n` is followed by a pause of `n` units (milliseconds)
    pub base_delay_ms: u64,

    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            base_delay_ms: 1000,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// Crawl scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Listing page the crawl starts from
    pub seed_url: String,

    /// Cap on listings processed
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Pause between detail requests (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_between_requests_ms: u64,

    /// Detail fetches in flight; 1 means strictly sequential
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Use a listing's inline content instead of fetching its page
    #[serde(default)]
    pub use_inline_content: bool,

    #[serde(default)]
    pub pagination: Option<Pagination>,
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_max_concurrency() -> usize {
    1
}

/// Remote browser (W3C WebDriver) used instead of plain HTTP
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// WebDriver endpoint, e.g. `http://localhost:4444`
    pub webdriver_url: String,

    #[serde(default = "default_browser_name")]
    pub browser_name: String,

    /// How long to wait for `document.readyState == "complete"` (seconds)
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Extra settle time after the page reports ready (milliseconds)
    #[serde(default = "default_render_wait")]
    pub render_wait_ms: u64,

    /// Incremental scrolls to trigger lazy-loaded content
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,

    /// Pause after each scroll (milliseconds)
    #[serde(default = "default_scroll_pause")]
    pub scroll_pause_ms: u64,

    /// Timeout for a single WebDriver command (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_browser_name() -> String {
    "safari".to_string()
}

fn default_page_load_timeout() -> u64 {
    10
}

fn default_render_wait() -> u64 {
    3000
}

fn default_scroll_steps() -> u32 {
    2
}

fn default_scroll_pause() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    30
}

/// Listing page extraction rules
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListingConfig {
    /// Keep only titles containing this (case-insensitive)
    #[serde(default)]
    pub keyword: Option<String>,

    pub rules: Vec<SelectorRule>,

    #[serde(default)]
    pub filters: ConfiguredFilter,
}

impl ListingConfig {
    /// Builds the rule set described by this section
    pub fn rule_set(&self) -> ExtractionRuleSet {
        let rules = ExtractionRuleSet::new(self.rules.clone()).with_filter(self.filters.clone());

        match &self.keyword {
            Some(keyword) => rules.with_keyword(keyword.clone()),
            None => rules,
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    pub report_path: String,
    pub format: ReportFormat,

    /// Details longer than this are cut in the report
    pub details_preview_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: "scraped_listings.txt".to_string(),
            format: ReportFormat::Text,
            details_preview_chars: 200,
        }
    }
}
