//! Output module for writing crawl reports
//!
//! This module handles:
//! - The result sink interface
//! - Plain-text reports in the classic item-block layout
//! - Markdown reports with summary tables
//! - The short console summary printed after a run

mod markdown;
mod text;
mod traits;

pub use markdown::{format_markdown_report, MarkdownReportSink};
pub use text::{format_summary, TextReportSink};
pub use traits::{preview, OutputError, OutputResult, ReportFormat, ReportOptions, ResultSink};

/// Builds the sink for a report format
pub fn sink_for(format: ReportFormat, options: ReportOptions) -> Box<dyn ResultSink> {
    match format {
        ReportFormat::Text => Box::new(TextReportSink::new(options)),
        ReportFormat::Markdown => Box::new(MarkdownReportSink::new(options)),
    }
}
