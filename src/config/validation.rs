use crate::config::types::{BrowserConfig, Config, CrawlConfig, FetchConfig, OutputConfig};
use crate::ConfigError;
use reqwest::header::HeaderValue;
use url::Url;

/// Upper bound on concurrent detail fetches
pub const MAX_CONCURRENCY: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_crawl_config(&config.crawl)?;
    if let Some(browser) = &config.browser {
        validate_browser_config(browser)?;
    }
    config.listing.rule_set().validate()?;
    config.detail.validate()?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be > 0".to_string(),
        ));
    }

    if config.base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "base-delay-ms must be > 0".to_string(),
        ));
    }

    for (name, value) in [
        ("user-agent", &config.user_agent),
        ("accept", &config.accept),
        ("accept-language", &config.accept_language),
    ] {
        HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("{} is not a valid header value: {}", name, e))
        })?;
    }

    Ok(())
}

/// Validates crawl configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_http_url("seed-url", &config.seed_url)?;

    if config.max_concurrency < 1 || config.max_concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.max_concurrency
        )));
    }

    if let Some(pagination) = &config.pagination {
        if pagination.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "pagination max-pages must be >= 1, got {}",
                pagination.max_pages
            )));
        }

        if !pagination.url_template.contains("{page}") {
            return Err(ConfigError::Validation(format!(
                "pagination url-template '{}' must contain {{page}}",
                pagination.url_template
            )));
        }
    }

    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    validate_http_url("webdriver-url", &config.webdriver_url)?;

    if config.browser_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "browser-name cannot be empty".to_string(),
        ));
    }

    if config.command_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "command-timeout-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    if config.details_preview_chars == 0 {
        return Err(ConfigError::Validation(
            "details-preview-chars must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}
