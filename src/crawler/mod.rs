//! Crawler module: fetching pages and orchestrating a crawl
//!
//! This module contains the core crawling logic, including:
//! - Page retrieval over HTTP or a remote browser, with retry
//! - Request spacing shared by concurrent fetches
//! - Per-crawl session state
//! - The crawl orchestrator that ties listing parsing and detail
//!   extraction together

mod browser;
mod fetcher;
mod gate;
mod orchestrator;
mod session;

pub use browser::BrowserSource;
pub use fetcher::{
    build_http_client, AttemptOutcome, FetchAttempt, FetchError, Fetcher, HttpSource,
    PageSource, RetryPolicy, SourceError,
};
pub use gate::RequestGate;
pub use orchestrator::{
    run_crawl, CrawlOptions, CrawlReport, CrawlStats, Crawler, DetailRecord, Pagination,
    RecordStatus,
};
pub use session::CrawlSession;
