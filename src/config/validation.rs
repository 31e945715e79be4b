use std::net::{IpAddr, SocketAddr};

use eyre::Result;

use crate::config::models::{
    LimiterConfig, MAX_LIMITER_RPS, MIN_LIMITER_RPS, MailerConfig, MailerKind, ServerConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(mut limiter_errors) = Self::validate_limiter(&config.limiter) {
            errors.append(&mut limiter_errors);
        }

        for (field, value) in [
            ("shutdown.timeout", &config.shutdown.timeout),
            ("store.query_timeout", &config.store.query_timeout),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if let Err(mut mailer_errors) = Self::validate_mailer(&config.mailer) {
            errors.append(&mut mailer_errors);
        }

        for (i, origin) in config.cors.trusted_origins.iter().enumerate() {
            if let Err(e) = Self::validate_url(origin, &format!("cors.trusted_origins[{i}]")) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:4000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_limiter(config: &LimiterConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        // Checked even when disabled so that flipping `enabled` never surfaces a bad policy.
        if !(config.rps.is_finite() && config.rps > 0.0) {
            errors.push(ValidationError::InvalidField {
                field: "limiter.rps".to_string(),
                message: format!("must be a positive number, got {}", config.rps),
            });
        } else if !(MIN_LIMITER_RPS..=MAX_LIMITER_RPS).contains(&config.rps) {
            errors.push(ValidationError::InvalidField {
                field: "limiter.rps".to_string(),
                message: format!(
                    "must be between {MIN_LIMITER_RPS} and {MAX_LIMITER_RPS}, got {}",
                    config.rps
                ),
            });
        }
        if config.burst == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limiter.burst".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        for (i, proxy) in config.trusted_proxies.iter().enumerate() {
            if proxy.parse::<IpAddr>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("limiter.trusted_proxies[{i}]"),
                    message: format!("'{proxy}' is not an IP address"),
                });
            }
        }
        for (field, value) in [
            ("limiter.sweep_interval", &config.sweep_interval),
            ("limiter.idle_retention", &config.idle_retention),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_mailer(config: &MailerConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_duration("mailer.timeout", &config.timeout) {
            errors.push(e);
        }
        if config.sender.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "mailer.sender".to_string(),
            });
        }
        if config.kind == MailerKind::Webhook {
            match &config.url {
                Some(url) => {
                    if let Err(e) = Self::validate_url(url, "mailer.url") {
                        errors.push(e);
                    }
                }
                None => errors.push(ValidationError::MissingField {
                    field: "mailer.url".to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "duration must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
