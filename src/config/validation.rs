use crate::config::types::{Config, DownloadConfig, ForumConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if let Some(forum) = &config.forum {
        validate_forum_config(forum)?;
    }
    validate_download_config(&config.download)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates forum and pagination configuration
fn validate_forum_config(config: &ForumConfig) -> Result<(), ConfigError> {
    let domain = Url::parse(&config.domain)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid forum domain '{}': {}", config.domain, e)))?;

    if domain.scheme() != "http" && domain.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "forum domain '{}' must use http or https",
            config.domain
        )));
    }

    if domain.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "forum domain '{}' has no host",
            config.domain
        )));
    }

    if config.start_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "start-url cannot be empty".to_string(),
        ));
    }

    if config.page_param.trim().is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(
            "max-consecutive-failures must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates download limits and retry policy
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("global-limit", config.global_limit as u64),
        ("per-host-limit", config.per_host_limit as u64),
        ("max-retries", config.max_retries as u64),
        ("timeout-secs", config.timeout_secs),
        ("chunk-size", config.chunk_size as u64),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if config.backoff_cap_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-cap-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_cap_ms, config.backoff_base_ms
        )));
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
    for (name, path) in [
        ("database-path", &config.database_path),
        ("img-dir", &config.img_dir),
        ("links-dir", &config.links_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}
