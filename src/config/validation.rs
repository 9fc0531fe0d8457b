use crate::config::types::{
    Config, CrawlerConfig, JobConfig, OrchestratorConfig, ProxyConfig, RateLimitSettings,
    ScopeConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job_config(&config.job)?;
    validate_crawler_config(&config.crawler)?;
    validate_scope_config(&config.scope)?;
    validate_rate_limit(&config.rate_limit)?;
    validate_proxy(&config.proxy)?;
    if let Some(orchestrator) = &config.orchestrator {
        validate_orchestrator(orchestrator)?;
    }
    Ok(())
}

fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
    if config.job_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "job-name cannot be empty".to_string(),
        ));
    }

    if config
        .job_name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(ConfigError::Validation(format!(
            "job-name must not contain path separators, got '{}'",
            config.job_name
        )));
    }

    if config.workers < 1 {
        return Err(ConfigError::Validation(format!(
            "workers must be >= 1, got {}",
            config.workers
        )));
    }

    if config.min_space_required_gib < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min-space-required-gib must be >= 0, got {}",
            config.min_space_required_gib
        )));
    }

    if config.wal_dump_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "wal-dump-interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.max_concurrent_assets < 1 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-assets must be >= 1, got {}",
            config.max_concurrent_assets
        )));
    }

    if config.http_timeout < 1 || config.read_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "http-timeout and read-timeout-secs must be >= 1 second".to_string(),
        ));
    }

    for status in &config.warc_discard_status {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "warc-discard-status contains an invalid HTTP status: {}",
                status
            )));
        }
    }

    Ok(())
}

fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for pattern in config.excluded_hosts.iter().chain(&config.included_hosts) {
        validate_host_pattern(pattern)?;
    }

    if config
        .excluded_strings
        .iter()
        .chain(&config.included_strings)
        .any(|s| s.is_empty())
    {
        return Err(ConfigError::Validation(
            "excluded-strings and included-strings cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(config: &RateLimitSettings) -> Result<(), ConfigError> {
    if config.capacity < 1.0 {
        return Err(ConfigError::Validation(format!(
            "rate-limit capacity must be >= 1, got {}",
            config.capacity
        )));
    }

    if config.refill_rate <= 0.0 || config.min_refill_rate <= 0.0 {
        return Err(ConfigError::Validation(
            "rate-limit refill rates must be positive".to_string(),
        ));
    }

    if config.min_refill_rate > config.refill_rate {
        return Err(ConfigError::Validation(format!(
            "min-refill-rate ({}) cannot exceed refill-rate ({})",
            config.min_refill_rate, config.refill_rate
        )));
    }

    if config.recovery_factor <= 0.0 || config.recovery_factor > 1.0 {
        return Err(ConfigError::Validation(format!(
            "recovery-factor must be in (0, 1], got {}",
            config.recovery_factor
        )));
    }

    if config.base_penalty_ms > config.max_penalty_ms {
        return Err(ConfigError::Validation(
            "base-penalty-ms cannot exceed max-penalty-ms".to_string(),
        ));
    }

    if config.max_buckets < 1 {
        return Err(ConfigError::Validation(
            "max-buckets must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_proxy(config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(proxy) = &config.url {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy url '{}': {}", proxy, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "proxy url must use http or https, got '{}'",
                url.scheme()
            )));
        }
    }

    for pattern in &config.bypass {
        validate_host_pattern(pattern)?;
    }

    Ok(())
}

fn validate_orchestrator(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    Url::parse(&config.url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid orchestrator url '{}': {}", config.url, e))
    })?;

    if config.project.is_empty() {
        return Err(ConfigError::Validation(
            "orchestrator project cannot be empty".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "orchestrator batch-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates a host pattern (supports `*.` wildcards)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_host_string(host)
}

/// Validates a host string (without wildcard prefix)
fn validate_host_string(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host cannot be empty".to_string(),
        ));
    }

    // IPv6 literals are accepted in brackets
    if host.starts_with('[') && host.ends_with(']') {
        return Ok(());
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("example.com").is_ok());
        assert!(validate_host_pattern("*.example.com").is_ok());
        assert!(validate_host_pattern("localhost").is_ok());
        assert!(validate_host_pattern("127.0.0.1").is_ok());
        assert!(validate_host_pattern("[::1]").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern(".example.com").is_err());
        assert!(validate_host_pattern("example.com.").is_err());
        assert!(validate_host_pattern("exa mple.com").is_err());
        assert!(validate_host_pattern("a..b").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rate_limit_bounds() {
        let mut config = Config::default();
        config.rate_limit.min_refill_rate = 5.0;
        config.rate_limit.refill_rate = 1.0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.rate_limit.recovery_factor = 0.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_discard_status() {
        let mut config = Config::default();
        config.crawler.warc_discard_status = vec![404, 999];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_invalid_proxy_scheme() {
        let mut config = Config::default();
        config.proxy.url = Some("ftp://proxy.example.com".to_string());
        assert!(validate(&config).is_err());

        config.proxy.url = Some("not a url".to_string());
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_job_name_rejects_separators() {
        let mut config = Config::default();
        config.job.job_name = "../escape".to_string();
        assert!(validate(&config).is_err());
    }
}
