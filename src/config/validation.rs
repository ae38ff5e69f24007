//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.
//! Unknown keys are already rejected during deserialization
//! (`deny_unknown_fields` on every section); this pass checks cross-field
//! and semantic constraints `serde` cannot express.

use super::Config;

/// Validation errors for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("store.url must not be empty")]
    EmptyStoreUrl,
    #[error("cache.url must not be empty")]
    EmptyCacheUrl,
    #[error("pubsub.url must not be empty")]
    EmptyPubSubUrl,
    #[error("tokens.access_secret must be at least 32 characters")]
    WeakAccessSecret,
    #[error("tokens.refresh_secret must be at least 32 characters")]
    WeakRefreshSecret,
    #[error("tokens.access_secret and tokens.refresh_secret must differ")]
    SharedTokenSecrets,
    #[error("rate_limit.burst_limit must not exceed rate_limit.window_limit")]
    BurstExceedsWindow,
    #[error("limits.message_max_len must be at least 1")]
    ZeroMessageLength,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.url.trim().is_empty() {
        errors.push(ValidationError::EmptyStoreUrl);
    }
    if config.cache.url.trim().is_empty() {
        errors.push(ValidationError::EmptyCacheUrl);
    }
    if config.pubsub.url.trim().is_empty() {
        errors.push(ValidationError::EmptyPubSubUrl);
    }

    if config.tokens.access_secret.len() < 32 {
        errors.push(ValidationError::WeakAccessSecret);
    }
    if config.tokens.refresh_secret.len() < 32 {
        errors.push(ValidationError::WeakRefreshSecret);
    }
    if config.tokens.access_secret == config.tokens.refresh_secret {
        errors.push(ValidationError::SharedTokenSecrets);
    }

    if config.rate_limit.burst_limit > config.rate_limit.window_limit {
        errors.push(ValidationError::BurstExceedsWindow);
    }

    if config.limits.message_max_len == 0 {
        errors.push(ValidationError::ZeroMessageLength);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [server]
            [store]
            url = "sqlite://test.db"
            [cache]
            url = "redis://localhost:6379"
            [pubsub]
            url = "redis://localhost:6379"
            [tokens]
            access_secret = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            refresh_secret = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn empty_store_url_rejected() {
        let mut config = base_config();
        config.store.url = String::new();
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::EmptyStoreUrl));
    }

    #[test]
    fn weak_secret_rejected() {
        let mut config = base_config();
        config.tokens.access_secret = "short".to_string();
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::WeakAccessSecret))
        );
    }

    #[test]
    fn shared_secrets_rejected() {
        let mut config = base_config();
        config.tokens.refresh_secret = config.tokens.access_secret.clone();
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::SharedTokenSecrets))
        );
    }

    #[test]
    fn burst_exceeding_window_rejected() {
        let mut config = base_config();
        config.rate_limit.burst_limit = 999;
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::BurstExceedsWindow))
        );
    }

    #[test]
    fn unknown_key_rejected_at_parse_time() {
        let toml_str = r#"
            [server]
            bogus_field = true
            [store]
            url = "sqlite://test.db"
            [cache]
            url = "redis://localhost:6379"
            [pubsub]
            url = "redis://localhost:6379"
            [tokens]
            access_secret = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            refresh_secret = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
        "#;
        let result: Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
