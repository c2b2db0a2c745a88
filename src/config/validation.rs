//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate path shapes (context path, built-in endpoint paths)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let context_path = &config.routing.context_path;
    if !context_path.is_empty() && (!context_path.starts_with('/') || context_path.ends_with('/')) {
        errors.push(ValidationError::new(
            "routing.context_path",
            "must be empty or start with '/' and not end with '/'",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.security.role_header.trim().is_empty() {
        errors.push(ValidationError::new("security.role_header", "must not be empty"));
    }

    if config.observability.metrics_enabled && !config.observability.metrics_path.starts_with('/') {
        errors.push(ValidationError::new("observability.metrics_path", "must start with '/'"));
    }

    if config.route_overview.enabled && !config.route_overview.path.starts_with('/') {
        errors.push(ValidationError::new("route_overview.path", "must start with '/'"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.routing.context_path = "/app/".into();
        config.timeouts.request_secs = 0;
        config.observability.metrics_path = "metrics".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "routing.context_path",
                "timeouts.request_secs",
                "observability.metrics_path",
            ]
        );
    }

    #[test]
    fn test_disabled_endpoints_skip_path_checks() {
        let mut config = ServerConfig::default();
        config.observability.metrics_enabled = false;
        config.observability.metrics_path = String::new();
        config.route_overview.enabled = false;
        config.route_overview.path = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
