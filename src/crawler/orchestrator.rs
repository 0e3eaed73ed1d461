//! Crawl orchestration
//!
//! A crawl runs in three steps:
//! 1. Fetch the seed listing page (failure aborts the crawl)
//! 2. Parse candidate listings, following pagination if configured, and
//!    truncate to `max_items`
//! 3. Visit every candidate's detail page and extract its fields, either
//!    strictly one after another or with bounded parallelism
//!
//! A failed detail page never aborts the crawl: it becomes a `Failed`
//! record. Records come back in listing order regardless of which fetch
//! finished first.

use crate::config::{Config, MAX_CONCURRENCY};
use crate::crawler::browser::BrowserSource;
use crate::crawler::fetcher::{Fetcher, HttpSource, PageSource, RetryPolicy, SourceError};
use crate::crawler::session::CrawlSession;
use crate::rules::{
    extract_details, parse_listings, scan_price, DetailRules, ExtractedDetails,
    ExtractionRuleSet, Listing, FETCH_ERROR_DETAILS, NOT_AVAILABLE,
};
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Additional listing pages derived from the seed
///
/// Page 0 is the seed itself; page `n >= 1` is `url_template` with `{seed}`
/// and `{page}` substituted. `max_pages` counts the seed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Pagination {
    pub url_template: String,
    pub max_pages: u32,
}

impl Pagination {
    /// URL of page `page` (1-based past the seed)
    pub fn page_url(&self, seed_url: &str, page: u32) -> String {
        self.url_template
            .replace("{seed}", seed_url)
            .replace("{page}", &page.to_string())
    }
}

/// Knobs of a single crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Cap on listings processed
    pub max_items: Option<usize>,

    /// Sequential mode: pause after each listing. Parallel mode: minimum
    /// spacing between request starts.
    pub delay_between_requests: Duration,

    /// Detail fetches in flight; 1 means strictly sequential
    pub max_concurrency: usize,

    pub retry: RetryPolicy,

    /// Use a listing's inline content instead of fetching its page
    pub use_inline_content: bool,

    pub pagination: Option<Pagination>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_items: None,
            delay_between_requests: Duration::from_secs(1),
            max_concurrency: 1,
            retry: RetryPolicy::default(),
            use_inline_content: false,
            pagination: None,
        }
    }
}

impl CrawlOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_items: config.crawl.max_items,
            delay_between_requests: Duration::from_millis(config.crawl.delay_between_requests_ms),
            max_concurrency: config.crawl.max_concurrency,
            retry: RetryPolicy::from_config(&config.fetch),
            use_inline_content: config.crawl.use_inline_content,
            pagination: config.crawl.pagination.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < 1 || self.max_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "max_concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.max_concurrency
            )));
        }

        if self.retry.max_retries < 1 {
            return Err(ConfigError::Validation(format!(
                "max_retries must be >= 1, got {}",
                self.retry.max_retries
            )));
        }

        if self.retry.base_delay.is_zero() {
            return Err(ConfigError::Validation(
                "base_delay must be > 0".to_string(),
            ));
        }

        if let Some(pagination) = &self.pagination {
            if pagination.max_pages < 1 {
                return Err(ConfigError::Validation(
                    "pagination max_pages must be >= 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Outcome of one listing's detail phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Ok,
    Failed(String),
}

/// Extracted data for one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    pub title: String,
    pub url: String,

    /// First currency amount found, or `"N/A"`
    pub price: String,

    /// Cleaned description, or `"N/A"`
    pub details: String,

    pub fetched_at: DateTime<Utc>,
    pub status: RecordStatus,
}

impl DetailRecord {
    fn extracted(listing: &Listing, extracted: ExtractedDetails) -> Self {
        Self {
            title: listing.title.clone(),
            url: listing.url.clone(),
            price: extracted.price,
            details: extracted.details,
            fetched_at: Utc::now(),
            status: RecordStatus::Ok,
        }
    }

    fn inline(listing: &Listing, content: &str, rules: &DetailRules) -> Self {
        let price = scan_price(content, rules).unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self::extracted(
            listing,
            ExtractedDetails {
                price,
                details: content.to_string(),
            },
        )
    }

    fn failed(listing: &Listing, reason: String) -> Self {
        Self {
            title: listing.title.clone(),
            url: listing.url.clone(),
            price: NOT_AVAILABLE.to_string(),
            details: FETCH_ERROR_DETAILS.to_string(),
            fetched_at: Utc::now(),
            status: RecordStatus::Failed(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }

    pub fn has_price(&self) -> bool {
        self.price != NOT_AVAILABLE
    }
}

/// Counters of a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Unique listings collected before truncation
    pub listings_found: usize,

    /// Listings that produced a record
    pub listings_processed: usize,

    pub succeeded: usize,
    pub failed: usize,

    /// Records with a price other than `"N/A"`
    pub priced: usize,

    pub elapsed: Duration,
}

impl CrawlStats {
    fn from_records(listings_found: usize, records: &[DetailRecord], elapsed: Duration) -> Self {
        let succeeded = records.iter().filter(|r| r.is_ok()).count();
        Self {
            listings_found,
            listings_processed: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            priced: records.iter().filter(|r| r.has_price()).count(),
            elapsed,
        }
    }
}

/// Everything a crawl produced, handed to a result sink
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub seed_url: String,

    /// One record per attempted listing, in listing order
    pub records: Vec<DetailRecord>,

    /// The crawl stopped early; `records` holds what completed
    pub cancelled: bool,

    pub stats: CrawlStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Crawl engine bound to one page source
pub struct Crawler {
    source: Arc<dyn PageSource>,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            cancel: CancellationToken::new(),
        }
    }

    /// Picks the page source the configuration asks for
    ///
    /// A `[browser]` section selects the remote browser, otherwise plain
    /// HTTP is used.
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let source: Arc<dyn PageSource> = match &config.browser {
            Some(browser) => Arc::new(BrowserSource::from_config(browser)?),
            None => Arc::new(HttpSource::from_config(&config.fetch)?),
        };
        Ok(Self::new(source))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this crawler's crawls when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one crawl
    ///
    /// # Arguments
    ///
    /// * `seed_url` - The listing page to start from
    /// * `listing_rules` - Rules that find candidates on listing pages
    /// * `detail_rules` - Rules that extract fields from detail pages
    /// * `options` - Limits, pacing and retry behavior
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl ran, possibly with failed records or
    ///   cancelled part way
    /// * `Err(HarvestError::Config)` - Invalid arguments, no request was made
    /// * `Err(HarvestError::SeedFetch)` - The seed page could not be fetched
    pub async fn crawl(
        &self,
        seed_url: &str,
        listing_rules: &ExtractionRuleSet,
        detail_rules: &DetailRules,
        options: &CrawlOptions,
    ) -> Result<CrawlReport, HarvestError> {
        options.validate()?;
        listing_rules.validate()?;
        let seed = parse_seed(seed_url)?;

        let mut session = CrawlSession::new(self.cancel.clone(), options.delay_between_requests);
        let fetcher = Fetcher::new(Arc::clone(&self.source), options.retry);
        let gated = fetcher.clone().with_gate(Arc::clone(session.gate()));

        tracing::info!(
            "Starting crawl of {} via {} (max_concurrency={})",
            seed_url,
            self.source.name(),
            options.max_concurrency
        );

        let seed_content = match gated.fetch_with_cancel(seed_url, session.cancel_token()).await {
            Ok(content) => content,
            Err(e) if e.is_cancelled() => {
                tracing::info!("Crawl cancelled before the seed page was fetched");
                return Ok(finish(&session, seed_url, 0, Vec::new()));
            }
            Err(e) => {
                tracing::error!("Failed to fetch seed page {}: {}", seed_url, e);
                return Err(HarvestError::SeedFetch(e));
            }
        };

        let mut listings = collect_listings(
            &gated,
            &mut session,
            &seed,
            &seed_content,
            listing_rules,
            options,
        )
        .await;
        let found = listings.len();

        if let Some(max_items) = options.max_items {
            listings.truncate(max_items);
        }
        tracing::info!("Found {} listings, processing {}", found, listings.len());

        let records = if options.max_concurrency <= 1 {
            run_sequential(&fetcher, &session, &listings, detail_rules, options).await
        } else {
            run_parallel(&gated, &session, &listings, detail_rules, options).await
        };

        let report = finish(&session, seed_url, found, records);
        tracing::info!(
            "Crawl finished: {} records ({} failed, {} with prices) in {:?}{}",
            report.stats.listings_processed,
            report.stats.failed,
            report.stats.priced,
            report.stats.elapsed,
            if report.cancelled { ", cancelled" } else { "" }
        );

        Ok(report)
    }

    /// Releases the page source
    pub async fn close(&self) -> Result<(), SourceError> {
        self.source.close().await
    }
}

/// Runs the crawl a configuration describes, then closes the page source
///
/// The report is returned, not written; see [`crate::output`].
pub async fn run_crawl(config: &Config, cancel: CancellationToken) -> Result<CrawlReport, HarvestError> {
    let crawler = Crawler::from_config(config)?.with_cancellation(cancel);
    let rules = config.listing.rule_set();
    let options = CrawlOptions::from_config(config);

    let result = crawler
        .crawl(&config.crawl.seed_url, &rules, &config.detail, &options)
        .await;

    if let Err(e) = crawler.close().await {
        tracing::warn!("Failed to close page source: {}", e);
    }

    result
}

fn parse_seed(seed_url: &str) -> Result<Url, ConfigError> {
    let seed = Url::parse(seed_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed_url, e)))?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed_url
        )));
    }

    Ok(seed)
}

fn finish(
    session: &CrawlSession,
    seed_url: &str,
    listings_found: usize,
    records: Vec<DetailRecord>,
) -> CrawlReport {
    CrawlReport {
        seed_url: seed_url.to_string(),
        stats: CrawlStats::from_records(listings_found, &records, session.elapsed()),
        records,
        cancelled: session.is_cancelled(),
        started_at: session.started_at(),
        finished_at: Utc::now(),
    }
}

fn limit_reached(collected: &[Listing], options: &CrawlOptions) -> bool {
    options.max_items.is_some_and(|max| collected.len() >= max)
}

/// Adds listings the session has not seen yet
fn admit_all(
    session: &mut CrawlSession,
    collected: &mut Vec<Listing>,
    page_listings: Vec<Listing>,
) {
    collected.extend(
        page_listings
            .into_iter()
            .filter(|listing| session.admit(listing)),
    );
}

/// Listings from the seed page and any paginated pages, in page order
///
/// No further page is fetched once `max_items` listings are known, but every
/// unique listing on a fetched page is kept so the caller can report how many
/// were found before truncating.
async fn collect_listings(
    fetcher: &Fetcher,
    session: &mut CrawlSession,
    seed: &Url,
    seed_content: &str,
    rules: &ExtractionRuleSet,
    options: &CrawlOptions,
) -> Vec<Listing> {
    let mut collected = Vec::new();

    let page_listings = parse_listings(seed_content, seed, rules);
    let on_page = page_listings.len();
    admit_all(session, &mut collected, page_listings);
    tracing::info!("Page 1: found {} listings (total: {})", on_page, collected.len());

    let Some(pagination) = &options.pagination else {
        return collected;
    };

    let cancel = session.cancel_token().clone();
    for page in 1..pagination.max_pages {
        if limit_reached(&collected, options) || cancel.is_cancelled() {
            break;
        }

        let page_url = pagination.page_url(seed.as_str(), page);
        let base = match Url::parse(&page_url) {
            Ok(base) => base,
            Err(e) => {
                tracing::error!("Skipping page {}: invalid URL '{}': {}", page + 1, page_url, e);
                continue;
            }
        };

        tracing::info!("Scraping page {}: {}", page + 1, page_url);
        match fetcher.fetch_with_cancel(&page_url, &cancel).await {
            Ok(content) => {
                let page_listings = parse_listings(&content, &base, rules);
                let on_page = page_listings.len();
                admit_all(session, &mut collected, page_listings);
                tracing::info!(
                    "Page {}: found {} listings (total: {})",
                    page + 1,
                    on_page,
                    collected.len()
                );
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                tracing::error!("Error scraping page {}: {}", page + 1, e);
            }
        }
    }

    collected
}

/// Detail phase for one listing
///
/// `None` if cancelled before its fetch started or while waiting to retry.
async fn process_listing(
    fetcher: &Fetcher,
    listing: &Listing,
    position: usize,
    total: usize,
    rules: &DetailRules,
    options: &CrawlOptions,
    cancel: &CancellationToken,
) -> Option<DetailRecord> {
    tracing::info!("Fetching details {}/{}: {}", position + 1, total, listing.url);

    if let Some(content) = inline_content(listing, options) {
        return Some(DetailRecord::inline(listing, content, rules));
    }

    match fetcher.fetch_with_cancel(&listing.url, cancel).await {
        Ok(content) => {
            let extracted = extract_details(&content, &listing.url, rules);
            tracing::info!("Price: {}", extracted.price);
            Some(DetailRecord::extracted(listing, extracted))
        }
        Err(e) if e.is_cancelled() => None,
        Err(e) => {
            tracing::error!("Failed to fetch details for {}: {}", listing.url, e);
            Some(DetailRecord::failed(listing, e.to_string()))
        }
    }
}

fn inline_content<'a>(listing: &'a Listing, options: &CrawlOptions) -> Option<&'a str> {
    if options.use_inline_content {
        listing.raw_content.as_deref()
    } else {
        None
    }
}

/// One listing at a time with a pause between listings
///
/// Listings served from inline content make no request and are not
/// followed by a pause.
async fn run_sequential(
    fetcher: &Fetcher,
    session: &CrawlSession,
    listings: &[Listing],
    rules: &DetailRules,
    options: &CrawlOptions,
) -> Vec<DetailRecord> {
    let cancel = session.cancel_token();
    let total = listings.len();
    let mut records = Vec::with_capacity(total);

    for (position, listing) in listings.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        match process_listing(fetcher, listing, position, total, rules, options, cancel).await {
            Some(record) => records.push(record),
            None => break,
        }

        let is_last = position + 1 == total;
        if !is_last && inline_content(listing, options).is_none() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(options.delay_between_requests) => {}
            }
        }
    }

    records
}

/// Up to `max_concurrency` listings in flight
///
/// `fetcher` carries the session's gate, so every request start, retries
/// included, is spaced by `delay_between_requests`.
async fn run_parallel(
    fetcher: &Fetcher,
    session: &CrawlSession,
    listings: &[Listing],
    rules: &DetailRules,
    options: &CrawlOptions,
) -> Vec<DetailRecord> {
    let cancel = session.cancel_token();
    let total = listings.len();

    let mut indexed: Vec<(usize, DetailRecord)> = stream::iter(listings.iter().enumerate())
        .map(|(position, listing)| async move {
            if cancel.is_cancelled() {
                return None;
            }
            process_listing(fetcher, listing, position, total, rules, options, cancel)
                .await
                .map(|record| (position, record))
        })
        .buffer_unordered(options.max_concurrency)
        .filter_map(|result| async move { result })
        .collect()
        .await;

    indexed.sort_by_key(|(position, _)| *position);
    indexed.into_iter().map(|(_, record)| record).collect()
}
