//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use listing_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Seed page: {}", config.crawl.seed_url);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{BrowserConfig, Config, CrawlConfig, FetchConfig, ListingConfig, OutputConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, MAX_CONCURRENCY};
