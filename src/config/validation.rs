//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - TLS server names must be DNS names or IP addresses
//! - Value ranges (max-age, cache bound, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config
//! - Runs before a transport is built from the config

use std::net::SocketAddr;

use rustls::pki_types::ServerName;

use crate::config::schema::{AltSvcConfig, FetchConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a valid TLS server name")]
    InvalidServerName { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: {value:?} is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a complete client configuration.
pub fn validate_config(config: &FetchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_alt_svc(&config.alt_svc) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    let transport = &config.transport;
    if let Some(name) = &transport.server_name {
        check_server_name("transport.server_name", name, &mut errors);
    }
    if transport.connect_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "transport.connect_timeout_ms" });
    }
    if transport.request_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "transport.request_timeout_ms" });
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the Alt-Svc routing settings on their own.
pub fn validate_alt_svc(config: &AltSvcConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if let Some(name) = &config.alternative_server_name {
        check_server_name("alt_svc.alternative_server_name", name, &mut errors);
    }
    if config.default_max_age_secs == 0 {
        errors.push(ValidationError::Zero { field: "alt_svc.default_max_age_secs" });
    }
    if config.max_origins == 0 {
        errors.push(ValidationError::Zero { field: "alt_svc.max_origins" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_server_name(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.is_empty() || ServerName::try_from(value).is_err() {
        errors.push(ValidationError::InvalidServerName {
            field,
            value: value.to_string(),
        });
    }
}
