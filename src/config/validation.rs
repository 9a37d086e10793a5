use super::models::Config;
use thiserror::Error;

/// Upper bound the platform accepts for `maxResults`
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("api.page_size must be between 1 and {max}, got {actual}")]
    InvalidPageSize { actual: u32, max: u32 },

    #[error("api.base_url must start with http:// or https://, got '{url}'")]
    InvalidBaseUrl { url: String },

    #[error("pipeline.max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Interval must be positive: {field}")]
    ZeroInterval { field: String },

    #[error("Downloads are enabled but {field} is empty")]
    MissingDownloaderSetting { field: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_api(config)?;
    validate_pipeline(config)?;
    validate_schedule(config)?;
    validate_downloads(config)?;
    Ok(())
}

fn validate_api(config: &Config) -> Result<(), ValidationError> {
    let page_size = config.api.page_size;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize {
            actual: page_size,
            max: MAX_PAGE_SIZE,
        });
    }

    let url = &config.api.base_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidBaseUrl { url: url.clone() });
    }

    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    if config.pipeline.max_attempts == 0 {
        return Err(ValidationError::InvalidMaxAttempts);
    }

    // A zero throttle is allowed (tests, local stubs); a zero lease would never hold.
    if config.pipeline.lease_ttl.is_zero() {
        return Err(ValidationError::ZeroInterval {
            field: "pipeline.lease_ttl".to_string(),
        });
    }

    Ok(())
}

fn validate_schedule(config: &Config) -> Result<(), ValidationError> {
    let intervals = [
        ("schedule.daily_interval", config.schedule.daily_interval),
        ("schedule.frequent_interval", config.schedule.frequent_interval),
    ];

    for (field, interval) in intervals {
        if interval.is_zero() {
            return Err(ValidationError::ZeroInterval {
                field: field.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_downloads(config: &Config) -> Result<(), ValidationError> {
    let downloads = &config.downloads;
    if !downloads.enabled {
        return Ok(());
    }

    if downloads.binary.trim().is_empty() {
        return Err(ValidationError::MissingDownloaderSetting {
            field: "downloads.binary".to_string(),
        });
    }

    if downloads.output_template.trim().is_empty() {
        return Err(ValidationError::MissingDownloaderSetting {
            field: "downloads.output_template".to_string(),
        });
    }

    if downloads.timeout.is_zero() {
        return Err(ValidationError::ZeroInterval {
            field: "downloads.timeout".to_string(),
        });
    }

    Ok(())
}
