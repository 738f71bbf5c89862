//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes, timeouts, status codes)
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Protocol names are checked against the registry at bootstrap, not here

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.call_timeout_ms == 0 {
        errors.push(ValidationError::new("timeouts.call_timeout_ms", "must be > 0"));
    }
    if config.proxy.buffer_size == 0 {
        errors.push(ValidationError::new("proxy.buffer_size", "must be > 0"));
    }
    if config.grpc.dial_timeout_ms == 0 {
        errors.push(ValidationError::new("grpc.dial_timeout_ms", "must be > 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", config.observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = |name: &str| format!("routes[{i}].{name}");
        if route.name.is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate route name {}", route.name),
            ));
        }
        if route.protocol.is_empty() {
            errors.push(ValidationError::new(field("protocol"), "must not be empty"));
        }
        if route.target.is_empty() {
            errors.push(ValidationError::new(field("target"), "must not be empty"));
        }
        if let Some(prefix) = &route.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::new(field("path_prefix"), "must start with '/'"));
            }
        }
        if route.timeout_ms == Some(0) {
            errors.push(ValidationError::new(field("timeout_ms"), "must be > 0"));
        }
    }

    for (i, entry) in config.error_codes.iter().enumerate() {
        if !(100..=599).contains(&entry.http_status) {
            errors.push(ValidationError::new(
                format!("error_codes[{i}].http_status"),
                format!("invalid HTTP status {}", entry.http_status),
            ));
        }
    }
    for (i, status) in config.success_statuses.iter().enumerate() {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new(
                format!("success_statuses[{i}]"),
                format!("invalid HTTP status {status}"),
            ));
        } else if *status == 200 || config.success_statuses[..i].contains(status) {
            errors.push(ValidationError::new(
                format!("success_statuses[{i}]"),
                format!("status {status} is already a success status"),
            ));
        }
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
    use crate::config::schema::{ErrorCodeConfig, RouteConfig};

    fn route(name: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: Some("/api".to_string()),
            priority: 0,
            protocol: "http".to_string(),
            target: "127.0.0.1:3000".to_string(),
            method: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_routes_and_bad_prefix() {
        let mut config = GatewayConfig::default();
        let mut bad = route("api");
        bad.path_prefix = Some("api".to_string());
        config.routes = vec![route("api"), bad];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["routes[1].name", "routes[1].path_prefix"]);
    }

    #[test]
    fn invalid_statuses_rejected() {
        let mut config = GatewayConfig::default();
        config.error_codes.push(ErrorCodeConfig {
            code: 20001,
            http_status: 42,
        });
        config.success_statuses.push(700);
        config.proxy.buffer_size = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
