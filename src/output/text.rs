//! Plain-text report
//!
//! One block per record, separated by rules, in the layout the harvester's
//! users already read and grep:
//!
//! ```text
//! ITEM #1
//! Title: FS: Sony FE 24-70mm f/2.8 GM
//! Price: $1,450
//! URL: https://example.com/forum/topic/1
//! Details: Lightly used, caps and hood included...
//! Scraped: 2024-05-01 12:00:00
//! ```

use crate::crawler::{CrawlReport, RecordStatus};
use crate::output::traits::{preview, ReportOptions, ResultSink};
use chrono::Local;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes reports as plain-text item blocks
#[derive(Debug, Clone, Default)]
pub struct TextReportSink {
    options: ReportOptions,
}

impl TextReportSink {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }
}

impl ResultSink for TextReportSink {
    fn render(&self, report: &CrawlReport) -> String {
        let mut out = String::new();
        let rule = "-".repeat(80);

        out.push_str(&format!(
            "Web Scraper Results - Scraped on {}\n",
            report.finished_at.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        ));
        out.push_str(&format!("Seed: {}\n", report.seed_url));
        if let Some(hash) = &self.options.config_hash {
            out.push_str(&format!("Config hash: {}\n", hash));
        }
        if report.cancelled {
            out.push_str("Note: crawl was cancelled, results are partial\n");
        }
        out.push_str(&format!("{}\n\n", "=".repeat(80)));

        for (i, record) in report.records.iter().enumerate() {
            out.push_str(&format!("ITEM #{}\n", i + 1));
            out.push_str(&format!("Title: {}\n", record.title));
            out.push_str(&format!("Price: {}\n", record.price));
            out.push_str(&format!("URL: {}\n", record.url));
            out.push_str(&format!(
                "Details: {}\n",
                preview(&record.details, self.options.details_preview_chars)
            ));
            out.push_str(&format!(
                "Scraped: {}\n",
                record.fetched_at.with_timezone(&Local).format(TIMESTAMP_FORMAT)
            ));
            if let RecordStatus::Failed(reason) = &record.status {
                out.push_str(&format!("Status: failed ({})\n", reason));
            }
            out.push_str(&format!("{}\n\n", rule));
        }

        out
    }
}

/// Short console summary: totals and the first three records
pub fn format_summary(report: &CrawlReport) -> String {
    if report.records.is_empty() {
        return "No listings were scraped.\n".to_string();
    }

    let banner = "=".repeat(60);
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", banner));
    out.push_str("SCRAPING SUMMARY\n");
    out.push_str(&format!("{}\n", banner));
    out.push_str(&format!(
        "Total items scraped: {}\n",
        report.stats.listings_processed
    ));
    out.push_str(&format!("Items with prices: {}\n", report.stats.priced));
    if report.stats.failed > 0 {
        out.push_str(&format!("Failed items: {}\n", report.stats.failed));
    }
    if report.cancelled {
        out.push_str("Crawl was cancelled before it finished\n");
    }

    out.push_str("\nSample items:\n");
    for (i, record) in report.records.iter().take(3).enumerate() {
        out.push_str(&format!(
            "{}. {} - {}\n",
            i + 1,
            preview(&record.title, 60),
            record.price
        ));
    }
    out.push_str(&format!("{}\n", banner));

    out
}
