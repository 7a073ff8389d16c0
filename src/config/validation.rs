use crate::config::types::{Config, HttpConfig, JobConfig, RetryConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_http_config(&config.http)?;
    validate_retry_config(&config.retry)?;

    if config.jobs.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[job]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for job in &config.jobs {
        if !names.insert(job.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate job name '{}'",
                job.name
            )));
        }
        validate_job(job)?;
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeouts must be >= 1s, got request={}s connect={}s",
            config.request_timeout_secs, config.connect_timeout_secs
        )));
    }

    if let Some(path) = &config.ca_cert {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "ca-cert cannot be an empty path".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.backoff_unit_ms < 1 {
        return Err(ConfigError::Validation(
            "backoff-unit-ms must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates one job entry
fn validate_job(job: &JobConfig) -> Result<(), ConfigError> {
    if job.name.is_empty() {
        return Err(ConfigError::Validation(
            "job name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&job.base_url, "base-url", &job.name)?;
    validate_http_url(&job.link_base_url, "link-base-url", &job.name)?;

    if job.output.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}': output cannot be empty",
            job.name
        )));
    }

    if job.concurrency < 1 || job.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "job '{}': concurrency must be between 1 and 100, got {}",
            job.name, job.concurrency
        )));
    }

    if job.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "job '{}': max-pages must be >= 1",
            job.name
        )));
    }

    validate_columns(job)?;

    if job.view_prefix.is_empty() || job.download_prefix.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}': view-prefix and download-prefix cannot be empty",
            job.name
        )));
    }

    if job.page_param.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}': page-param cannot be empty",
            job.name
        )));
    }

    Ok(())
}

/// Validates the column schema and the two reserved link columns
fn validate_columns(job: &JobConfig) -> Result<(), ConfigError> {
    if job.columns.is_empty() {
        return Err(ConfigError::Validation(format!(
            "job '{}': columns cannot be empty",
            job.name
        )));
    }

    let mut seen = HashSet::new();
    for column in &job.columns {
        if column.is_empty() {
            return Err(ConfigError::Validation(format!(
                "job '{}': column names cannot be empty",
                job.name
            )));
        }
        if !seen.insert(column.as_str()) {
            return Err(ConfigError::Validation(format!(
                "job '{}': duplicate column '{}'",
                job.name, column
            )));
        }
    }

    for (key, reserved) in [
        ("view-column", &job.view_column),
        ("download-column", &job.download_column),
    ] {
        if !seen.contains(reserved.as_str()) {
            return Err(ConfigError::Validation(format!(
                "job '{}': {} '{}' is not one of the columns",
                job.name, key, reserved
            )));
        }
    }

    if job.view_column == job.download_column {
        return Err(ConfigError::Validation(format!(
            "job '{}': view-column and download-column must differ",
            job.name
        )));
    }

    Ok(())
}

fn validate_http_url(raw: &str, key: &str, job: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        ConfigError::InvalidUrl(format!("job '{}': invalid {} '{}': {}", job, key, raw, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "job '{}': {} '{}' must use http or https",
            job, key, raw
        )));
    }

    Ok(())
}
