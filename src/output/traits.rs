//! Result sink trait and shared report helpers

use crate::crawler::CrawlReport;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Report file formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Plain-text item blocks
    #[default]
    Text,

    /// Summary tables plus one section per record
    Markdown,
}

/// Settings shared by every sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Details longer than this many characters are cut and marked `...`
    pub details_preview_chars: usize,

    /// SHA-256 of the configuration that produced the report
    pub config_hash: Option<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            details_preview_chars: 200,
            config_hash: None,
        }
    }
}

/// Trait for result sinks
///
/// A sink turns a finished crawl into a report. Only `render` is required;
/// `write` stores the rendered report at `target`, replacing any existing
/// file.
pub trait ResultSink {
    /// Formats the report
    fn render(&self, report: &CrawlReport) -> String;

    /// Writes the report to `target`
    fn write(&self, report: &CrawlReport, target: &Path) -> OutputResult<()> {
        std::fs::write(target, self.render(report)).map_err(|source| OutputError::Write {
            path: target.display().to_string(),
            source,
        })?;
        tracing::info!("Results saved to {}", target.display());
        Ok(())
    }
}

/// Cuts `text` to at most `max_chars` characters, appending `...` when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
