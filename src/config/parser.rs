use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Printed in reports so that two result files can be tied to the exact
/// rule set that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ReportFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const QUOTES_CONFIG: &str = r##"
[fetch]
timeout-secs = 5
max-retries = 2
base-delay-ms = 250

[crawl]
seed-url = "https://quotes.toscrape.com/"
max-items = 10
delay-between-requests-ms = 500
max-concurrency = 2
use-inline-content = true

[[listing.rules]]
selector = "div.quote"
description = "Quote containers"
title-template = "{text}... - {author}"
fallback-href = "#quote-{index}"
content-field = "text"
fields = [
    { name = "text", selector = "span.text", max-chars = 50 },
    { name = "author", selector = "small.author" },
]

[output]
report-path = "quotes_test.txt"
format = "markdown"
"##;

    const FORUM_CONFIG: &str = r#"
[crawl]
seed-url = "https://forum.example.com/board/10/"
max-items = 50

[crawl.pagination]
url-template = "{seed}{page}/"
max-pages = 4

[browser]
webdriver-url = "http://localhost:4444"

[listing]
keyword = "sony"

[[listing.rules]]
selector = "tr td a[href*='/forum/topic/']"
description = "Topic links in table cells"

[[listing.rules]]
selector = "a[href*='/forum/topic/']"
description = "Any topic links"

[listing.filters]
strip-patterns = [" end"]
skip-titles = ["end", "→", "..."]
skip-numeric = true
required-prefixes = ["FS:", "WTB:", "FT:"]

[detail]
junk-tokens = ["quote", "edit", "report", "bump"]
min-fallback-price = 100
"#;

    #[test]
    fn test_load_quotes_config() {
        let file = create_temp_config(QUOTES_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.fetch.timeout_secs, 5);
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.crawl.max_items, Some(10));
        assert_eq!(config.crawl.max_concurrency, 2);
        assert!(config.crawl.use_inline_content);
        assert!(config.browser.is_none());
        assert_eq!(config.listing.rules.len(), 1);
        assert_eq!(config.listing.rules[0].fields.len(), 2);
        assert_eq!(config.listing.rules[0].fields[0].max_chars, Some(50));
        assert_eq!(config.output.format, ReportFormat::Markdown);
        assert_eq!(config.output.details_preview_chars, 200);
        // defaults
        assert_eq!(config.detail.max_lines, 15);
        assert!(config.fetch.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_load_forum_config() {
        let config = parse_config(FORUM_CONFIG).unwrap();

        let pagination = config.crawl.pagination.as_ref().unwrap();
        assert_eq!(pagination.max_pages, 4);
        assert_eq!(config.crawl.delay_between_requests_ms, 1000);
        assert_eq!(config.crawl.max_concurrency, 1);

        let browser = config.browser.as_ref().unwrap();
        assert_eq!(browser.browser_name, "safari");
        assert_eq!(browser.render_wait_ms, 3000);

        assert!(config.listing.filters.skip_numeric);
        assert_eq!(config.detail.min_fallback_price, 100);
        assert_eq!(config.detail.junk_tokens.len(), 4);

        let rules = config.listing.rule_set();
        assert_eq!(rules.keyword(), Some("sony"));
        assert_eq!(rules.rules().len(), 2);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = QUOTES_CONFIG.replace("max-concurrency = 2", "max-concurrency = 0");
        let result = parse_config(&content);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config(QUOTES_CONFIG);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.crawl.seed_url, "https://quotes.toscrape.com/");
        assert_eq!(hash.len(), 64);
    }
}
