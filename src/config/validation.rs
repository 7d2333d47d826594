use crate::config::types::{Config, CrawlConfig, FetchConfig, OutputConfig, PoolConfig, RetryConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_pool_config(&config.pool)?;
    validate_retry_config(&config.retry)?;
    validate_fetch_config(&config.fetch)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the crawl scope
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_domain(&config.allowed_domain)?;

    let start = Url::parse(&config.start_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid start-url '{}': {}", config.start_url, e))
    })?;

    if start.scheme() != "http" && start.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "start-url '{}' must use http or https",
            config.start_url
        )));
    }

    if start.host_str() != Some(config.allowed_domain.as_str()) {
        return Err(ConfigError::Validation(format!(
            "start-url host must be the allowed domain '{}', got '{}'",
            config.allowed_domain, config.start_url
        )));
    }

    let prefix = Url::parse(&config.path_prefix).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid path-prefix '{}': {}", config.path_prefix, e))
    })?;

    if prefix.host_str() != Some(config.allowed_domain.as_str()) {
        return Err(ConfigError::Validation(format!(
            "path-prefix host must be the allowed domain '{}', got '{}'",
            config.allowed_domain, config.path_prefix
        )));
    }

    if !start.as_str().starts_with(prefix.as_str()) {
        return Err(ConfigError::Validation(format!(
            "start-url '{}' is outside path-prefix '{}'",
            config.start_url, config.path_prefix
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.claim_batch < 1 {
        return Err(ConfigError::Validation(format!(
            "claim-batch must be >= 1, got {}",
            config.claim_batch
        )));
    }

    Ok(())
}

/// Validates worker and pool sizing
fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 64 {
        return Err(ConfigError::Validation(format!(
            "pool-size must be between 1 and 64, got {}",
            config.pool_size
        )));
    }

    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.recycle_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "recycle-interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.retry_ceiling < 1 {
        return Err(ConfigError::Validation(format!(
            "retry-ceiling must be >= 1, got {}",
            config.retry_ceiling
        )));
    }

    if config.backoff_base_ms > config.backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-base-ms ({}) must not exceed backoff-cap-ms ({})",
            config.backoff_base_ms, config.backoff_cap_ms
        )));
    }

    Ok(())
}

/// Validates page loading options
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.readiness_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "readiness-timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(selector) = &config.content_selector {
        scraper::Selector::parse(selector).map_err(|e| {
            ConfigError::Validation(format!("Invalid content-selector '{}': {:?}", selector, e))
        })?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a bare host name
fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "allowed-domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "allowed-domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "allowed-domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}
