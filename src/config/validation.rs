use super::models::{Config, SourceProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Source provider is S3 but no bucket is configured")]
    MissingS3Bucket,

    #[error("Source provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Source provider is local but no root directory is configured")]
    MissingLocalRoot,

    #[error("{field} must be at least 1")]
    ZeroCount { field: String },

    #[error("Store cache size must be positive")]
    InvalidCacheSize,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_source(config)?;
    validate_store(config)?;
    validate_ingest(config)?;
    Ok(())
}

fn validate_source(config: &Config) -> Result<(), ValidationError> {
    match config.source.provider {
        SourceProvider::S3 => {
            if config.source.bucket.as_deref().is_none_or(str::is_empty) {
                return Err(ValidationError::MissingS3Bucket);
            }
            if config.source.access_key.is_none() || config.source.secret_key.is_none() {
                return Err(ValidationError::MissingS3Credentials);
            }
        }
        SourceProvider::Local => {
            if config.source.root.is_none() {
                return Err(ValidationError::MissingLocalRoot);
            }
        }
        SourceProvider::Memory => {}
    }

    Ok(())
}

fn validate_store(config: &Config) -> Result<(), ValidationError> {
    if config.store.cache_size.as_u64() == 0 {
        return Err(ValidationError::InvalidCacheSize);
    }

    Ok(())
}

fn validate_ingest(config: &Config) -> Result<(), ValidationError> {
    if config.ingest.workers == 0 {
        return Err(ValidationError::ZeroCount {
            field: "ingest.workers".to_string(),
        });
    }

    if config.ingest.commit_attempts == 0 {
        return Err(ValidationError::ZeroCount {
            field: "ingest.commit_attempts".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    fn s3_config() -> Config {
        let mut config = Config::default();
        config.source.provider = SourceProvider::S3;
        config.source.bucket = Some("edge-logs".to_string());
        config.source.access_key = Some("AKIA".to_string());
        config.source.secret_key = Some("secret".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
        assert!(validate(&s3_config()).is_ok());
    }

    #[test]
    fn test_s3_bucket_missing() {
        let mut config = s3_config();
        config.source.bucket = None;
        assert!(matches!(validate(&config), Err(ValidationError::MissingS3Bucket)));
    }

    #[test]
    fn test_s3_credentials_missing() {
        let mut config = s3_config();
        config.source.secret_key = None;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingS3Credentials)
        ));
    }

    #[test]
    fn test_local_root_missing() {
        let mut config = Config::default();
        config.source.root = None;
        assert!(matches!(validate(&config), Err(ValidationError::MissingLocalRoot)));
    }

    #[test]
    fn test_zero_workers() {
        let mut config = Config::default();
        config.ingest.workers = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroCount { .. })));
    }

    #[test]
    fn test_zero_commit_attempts() {
        let mut config = Config::default();
        config.ingest.commit_attempts = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroCount { .. })));
    }

    #[test]
    fn test_zero_cache_size() {
        let mut config = Config::default();
        config.store.cache_size = ByteSize(0);
        assert!(matches!(validate(&config), Err(ValidationError::InvalidCacheSize)));
    }
}
