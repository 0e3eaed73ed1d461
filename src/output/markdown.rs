//! Markdown report generation
//!
//! This module generates a human-readable markdown report of a crawl:
//! run information, overall statistics, a table of every record and one
//! section per record with its details.

use crate::crawler::{CrawlReport, RecordStatus};
use crate::output::traits::{preview, ReportOptions, ResultSink};

/// Writes reports as markdown
#[derive(Debug, Clone, Default)]
pub struct MarkdownReportSink {
    options: ReportOptions,
}

impl MarkdownReportSink {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }
}

impl ResultSink for MarkdownReportSink {
    fn render(&self, report: &CrawlReport) -> String {
        format_markdown_report(report, &self.options)
    }
}

/// Formats a crawl report as markdown
pub fn format_markdown_report(report: &CrawlReport, options: &ReportOptions) -> String {
    let mut md = String::new();
    let stats = &report.stats;

    md.push_str("# Listing Harvest Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", report.seed_url));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        stats.elapsed.as_secs_f64()
    ));
    md.push_str(&format!(
        "- **Status**: {}\n",
        if report.cancelled { "cancelled" } else { "completed" }
    ));
    if let Some(hash) = &options.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Listings Found | {} |\n", stats.listings_found));
    md.push_str(&format!("| Listings Processed | {} |\n", stats.listings_processed));
    md.push_str(&format!("| Succeeded | {} |\n", stats.succeeded));
    md.push_str(&format!("| Failed | {} |\n", stats.failed));
    md.push_str(&format!("| With Prices | {} |\n\n", stats.priced));

    if report.records.is_empty() {
        md.push_str("_No listings were scraped._\n");
        return md;
    }

    // Record table
    md.push_str("## Listings\n\n");
    md.push_str("| # | Title | Price | Status |\n");
    md.push_str("|---|-------|-------|--------|\n");
    for (i, record) in report.records.iter().enumerate() {
        let status = match &record.status {
            RecordStatus::Ok => "ok",
            RecordStatus::Failed(_) => "failed",
        };
        md.push_str(&format!(
            "| {} | [{}]({}) | {} | {} |\n",
            i + 1,
            escape_cell(&record.title),
            record.url,
            escape_cell(&record.price),
            status
        ));
    }
    md.push('\n');

    // Per-record details
    md.push_str("## Details\n\n");
    for (i, record) in report.records.iter().enumerate() {
        md.push_str(&format!("### {}. {}\n\n", i + 1, record.title));
        md.push_str(&format!("- **URL**: {}\n", record.url));
        md.push_str(&format!("- **Price**: {}\n", record.price));
        md.push_str(&format!("- **Scraped**: {}\n", record.fetched_at.to_rfc3339()));
        if let RecordStatus::Failed(reason) = &record.status {
            md.push_str(&format!("- **Error**: {}\n", reason));
        }
        md.push('\n');

        let details = preview(&record.details, options.details_preview_chars);
        for line in details.lines() {
            md.push_str(&format!("> {}\n", line));
        }
        md.push('\n');
    }

    md
}

/// Keeps table cells on one line and out of the column syntax
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
