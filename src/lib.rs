//! Listing Harvester: a polite crawl-and-extract engine
//!
//! This crate fetches a listing page, extracts candidate links with
//! data-driven CSS selector rules, visits every candidate's detail page and
//! pulls out structured fields (price, description), tolerating partial
//! failure and rate-limiting its own requests.

pub mod config;
pub mod crawler;
pub mod output;
pub mod rules;
pub mod url;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to fetch seed page: {0}")]
    SeedFetch(#[source] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOptions, CrawlReport, Crawler, DetailRecord, RecordStatus};
pub use rules::{ExtractionRuleSet, Listing};
