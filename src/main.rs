//! Listing Harvester main entry point
//!
//! This is the command-line interface for the listing harvester.

use clap::Parser;
use listing_harvester::config::{load_config_with_hash, Config};
use listing_harvester::crawler::run_crawl;
use listing_harvester::output::{format_summary, sink_for, ReportFormat, ReportOptions};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Listing Harvester: a polite crawl-and-extract tool
///
/// Fetches a listing page, finds candidate listings with the CSS selector
/// rules from the configuration file, visits each candidate's page and
/// writes title, price and details to a report.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite crawl-and-extract tool", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Write the report here instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Report format, overriding the configured one
    #[arg(long, value_enum)]
    format: Option<ReportFormat>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &config_hash);
        return Ok(());
    }

    let report_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.report_path));
    let format = cli.format.unwrap_or(config.output.format);

    handle_crawl(config, config_hash, report_path, format, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvester=info,warn"),
            1 => EnvFilter::new("listing_harvester=debug,info"),
            2 => EnvFilter::new("listing_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, config_hash: &str) {
    println!("=== Listing Harvester Dry Run ===\n");

    println!("Crawl:");
    println!("  Seed URL: {}", config.crawl.seed_url);
    match config.crawl.max_items {
        Some(max) => println!("  Max items: {}", max),
        None => println!("  Max items: unlimited"),
    }
    println!(
        "  Delay between requests: {}ms",
        config.crawl.delay_between_requests_ms
    );
    println!("  Max concurrency: {}", config.crawl.max_concurrency);
    if let Some(pagination) = &config.crawl.pagination {
        println!(
            "  Pagination: {} ({} pages)",
            pagination.url_template, pagination.max_pages
        );
    }

    println!("\nFetching:");
    match &config.browser {
        Some(browser) => println!(
            "  Remote browser: {} at {}",
            browser.browser_name, browser.webdriver_url
        ),
        None => println!("  Plain HTTP (timeout {}s)", config.fetch.timeout_secs),
    }
    println!(
        "  Retries: {} (backoff unit {}ms)",
        config.fetch.max_retries, config.fetch.base_delay_ms
    );

    println!("\nListing Rules ({}):", config.listing.rules.len());
    for rule in &config.listing.rules {
        println!("  - {} ({})", rule.selector, rule.description);
    }
    if let Some(keyword) = &config.listing.keyword {
        println!("  Keyword: {}", keyword);
    }

    println!("\nOutput:");
    println!("  Report: {} ({:?})", config.output.report_path, config.output.format);

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    report_path: PathBuf,
    format: ReportFormat,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing up with the results so far");
            trigger.cancel();
        }
    });

    tracing::info!("Target URL: {}", config.crawl.seed_url);

    let report = match run_crawl(&config, cancel).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    let sink = sink_for(
        format,
        ReportOptions {
            details_preview_chars: config.output.details_preview_chars,
            config_hash: Some(config_hash),
        },
    );
    sink.write(&report, &report_path)?;

    if !quiet {
        print!("{}", format_summary(&report));
        println!("Report written to {}", report_path.display());
    }

    Ok(())
}
